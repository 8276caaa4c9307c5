//! Classifier registry
//!
//! Explicit object mapping classifier types to instance factories. Built at
//! startup, passed by reference to whoever creates connections; there are no
//! process-wide registration tables. The Default classifier is always
//! registered and every chain the registry creates starts with it.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use crate::{Classifier, ClassifierChain, ClassifierType, DefaultClassifier};

/// Factory producing one classifier instance per connection
pub type ClassifierFactory = Box<dyn Fn() -> Arc<dyn Classifier> + Send + Sync>;

/// Registration misuse
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A factory for this type is already registered
    #[error("factory for {0:?} already registered")]
    AlreadyRegistered(ClassifierType),
}

/// Startup-built mapping from classifier type to factory
pub struct ClassifierRegistry {
    factories: BTreeMap<ClassifierType, ClassifierFactory>,
}

impl ClassifierRegistry {
    /// Create a registry holding only the mandatory Default factory
    pub fn new() -> Self {
        let mut factories: BTreeMap<ClassifierType, ClassifierFactory> = BTreeMap::new();
        factories.insert(
            ClassifierType::Default,
            Box::new(|| Arc::new(DefaultClassifier::new()) as Arc<dyn Classifier>),
        );
        Self { factories }
    }

    /// Register a factory for an optional classifier type
    pub fn register(
        &mut self,
        ty: ClassifierType,
        factory: ClassifierFactory,
    ) -> Result<(), RegistryError> {
        if self.factories.contains_key(&ty) {
            return Err(RegistryError::AlreadyRegistered(ty));
        }
        self.factories.insert(ty, factory);
        Ok(())
    }

    /// Types with a registered factory, ascending by priority
    pub fn registered(&self) -> Vec<ClassifierType> {
        self.factories.keys().copied().collect()
    }

    /// Instantiate a fresh chain for a new connection
    ///
    /// Every registered factory contributes one instance; the chain keeps
    /// them in ascending type order.
    pub fn create_chain(&self) -> ClassifierChain {
        let mut chain = ClassifierChain::new();
        for (&ty, factory) in &self.factories {
            let instance = factory();
            if instance.classifier_type() != ty {
                warn!(registered = ?ty, produced = ?instance.classifier_type(),
                      "factory produced mismatched classifier type, skipping");
                continue;
            }
            // Cannot collide: one factory per type.
            let _ = chain.assign(instance);
        }
        chain
    }
}

impl Default for ClassifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}
