//! Per-connection classifier chain
//!
//! Ordered membership list of the classifiers assigned to one connection.
//! The ordering invariant is load bearing: classifiers appear in ascending
//! type order, so an ascending walk visits them lowest priority first and
//! the merge engine can let later entries override earlier ones.
//!
//! The chain itself is not synchronized; the owning connection mutates and
//! walks it under the connection lock.

use std::sync::Arc;

use tracing::debug;

use crate::{Classifier, ClassifierType};

/// Chain management misuse
///
/// All non-fatal: the operation is rejected and logged, the chain is left
/// unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// A classifier of this type is already assigned
    #[error("classifier {0:?} already assigned")]
    AlreadyAssigned(ClassifierType),
    /// No classifier of this type is assigned
    #[error("classifier {0:?} not assigned")]
    NotAssigned(ClassifierType),
    /// The Default classifier cannot be unassigned
    #[error("classifier {0:?} is protected")]
    ProtectedClassifier(ClassifierType),
}

/// Ordered collection of the classifiers assigned to one connection
#[derive(Default)]
pub struct ClassifierChain {
    items: Vec<Arc<dyn Classifier>>,
}

impl ClassifierChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Assign a classifier, preserving ascending type order
    pub fn assign(&mut self, classifier: Arc<dyn Classifier>) -> Result<(), ChainError> {
        let ty = classifier.classifier_type();
        match self.items.binary_search_by_key(&ty, |c| c.classifier_type()) {
            Ok(_) => {
                debug!(classifier = ?ty, "assign rejected: already assigned");
                Err(ChainError::AlreadyAssigned(ty))
            }
            Err(pos) => {
                self.items.insert(pos, classifier);
                Ok(())
            }
        }
    }

    /// Unassign the classifier of the given type, dropping the chain's
    /// reference to it
    ///
    /// The Default classifier is protected and can never be removed.
    pub fn unassign(&mut self, ty: ClassifierType) -> Result<(), ChainError> {
        if ty == ClassifierType::Default {
            debug!("unassign rejected: default classifier is protected");
            return Err(ChainError::ProtectedClassifier(ty));
        }
        match self.items.binary_search_by_key(&ty, |c| c.classifier_type()) {
            Ok(pos) => {
                self.items.remove(pos);
                Ok(())
            }
            Err(_) => {
                debug!(classifier = ?ty, "unassign rejected: not assigned");
                Err(ChainError::NotAssigned(ty))
            }
        }
    }

    /// Find the assigned classifier of the given type
    pub fn find(&self, ty: ClassifierType) -> Option<Arc<dyn Classifier>> {
        self.items
            .binary_search_by_key(&ty, |c| c.classifier_type())
            .ok()
            .map(|pos| Arc::clone(&self.items[pos]))
    }

    /// Snapshot of the assigned classifiers, ascending by type
    ///
    /// The snapshot is stable and restartable: it reflects the chain at the
    /// moment of the call and is unaffected by later mutations. References
    /// taken here may outlive the connection lock.
    pub fn assigned(&self) -> Vec<Arc<dyn Classifier>> {
        self.items.clone()
    }

    /// Walk the assigned classifiers ascending without cloning references
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Classifier>> {
        self.items.iter()
    }

    /// Number of assigned classifiers
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the chain is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
