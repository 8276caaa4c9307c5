//! Classifier chain and merge/decision engine
//!
//! Every connection carries an ordered chain of independent classifiers.
//! Each classifier inspects packets and produces a process response: a
//! tri-state relevance verdict plus an optional set of actions. The merge
//! engine folds the chain's responses into one effective decision, resolving
//! conflicts per action by classifier priority.
//!
//! # Architecture
//!
//! ```text
//! packet ──► chain.process() ascending ──► [responses] ──► merge() ──► decision
//!                 │                                            │
//!                 └── relevance == No → unassign               └── drop / forward
//!                                                                  / accelerate
//! ```
//!
//! Classifiers are developed independently and never need knowledge of each
//! other; the ascending type order is the single arbitration rule.

#![warn(missing_docs)]

pub mod chain;
pub mod default;
pub mod diag;
pub mod dscp;
pub mod merge;
pub mod netlink;
pub mod parental;
pub mod registry;

pub use chain::{ChainError, ClassifierChain};
pub use default::DefaultClassifier;
pub use dscp::DscpClassifier;
pub use merge::{merge, MergedDecision};
pub use netlink::NetlinkClassifier;
pub use parental::ParentalControlClassifier;
pub use registry::ClassifierRegistry;

use std::sync::Arc;

use accel_common::{IpHeader, Sender, Timestamp, TimerGroup};
use accel_offload::{ConnSync, RuleCreate};
use arc_swap::ArcSwap;

/// Classifier types, recorded in ascending order of priority
///
/// `Default` must be first: it is the lowest priority, it is assigned to
/// every connection, and it can never be unassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[repr(u8)]
pub enum ClassifierType {
    /// Baseline classifier present on every connection
    Default = 0,
    /// DSCP inspection and remarking
    Dscp = 1,
    /// Externally fed policy (netlink control plane)
    Netlink = 2,
    /// Parental control subsystem
    ParentalControl = 3,
}

impl ClassifierType {
    /// All types, ascending by priority
    pub const ALL: [ClassifierType; 4] = [
        ClassifierType::Default,
        ClassifierType::Dscp,
        ClassifierType::Netlink,
        ClassifierType::ParentalControl,
    ];
}

/// Whether a classifier is relevant to a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum Relevance {
    /// Classifier has not yet determined relevance
    #[default]
    Maybe,
    /// Not relevant; the classifier is unassigned after this response is read
    No,
    /// Relevant; actions are inspected by the front end
    Yes,
}

/// A classifier's desire regarding connection acceleration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum AccelMode {
    /// Classifier does not care whether the connection is accelerated
    #[default]
    DontCare,
    /// Connection must not be accelerated
    No,
    /// Connection may be accelerated whenever
    Accel,
}

/// QoS tags for both directions
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct QosTags {
    /// Tag for the flow direction
    pub flow: u32,
    /// Tag for the return direction
    pub ret: u32,
}

/// DSCP marks for both directions
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct DscpMarks {
    /// Mark for the flow direction
    pub flow: u8,
    /// Mark for the return direction
    pub ret: u8,
}

/// Response produced by one classifier for one process pass
///
/// Actions are populated-or-absent at the type level: `None` means the
/// classifier asserted nothing for that action, and the merge engine skips
/// it. `dscp_deny` carries no payload; when set by any relevant classifier
/// the merged decision carries no DSCP mark at all.
#[derive(Debug, Clone, Default)]
pub struct ProcessResponse {
    /// Relevance verdict
    pub relevance: Relevance,
    /// When relevance was last (re)computed; not meaningful while `Maybe`
    pub became_relevant: Timestamp,
    /// Drop the packet at hand
    pub drop: Option<bool>,
    /// QoS tags to apply
    pub qos_tags: Option<QosTags>,
    /// Acceleration desire
    pub accel_mode: Option<AccelMode>,
    /// Timer group the connection should move to
    pub timer_group: Option<TimerGroup>,
    /// DSCP remarking to apply
    pub dscp: Option<DscpMarks>,
    /// Deny any DSCP changes on this connection
    pub dscp_deny: bool,
}

impl ProcessResponse {
    /// A relevant response with no actions asserted
    pub fn relevant() -> Self {
        Self {
            relevance: Relevance::Yes,
            became_relevant: Timestamp::now(),
            ..Self::default()
        }
    }

    /// A terminal not-relevant response
    pub fn not_relevant() -> Self {
        Self {
            relevance: Relevance::No,
            became_relevant: Timestamp::now(),
            ..Self::default()
        }
    }
}

/// Capability set implemented by every classifier
///
/// Instances are shared as `Arc<dyn Classifier>`: the chain holds one
/// reference under the connection lock, creators and diagnostic readers may
/// hold others, and the instance is destroyed when the last reference drops.
///
/// `process` calls for one connection are serialized by the front end under
/// the connection lock; `last_response` and `state_get` may race with a
/// process pass and must tolerate observing the previous response.
pub trait Classifier: Send + Sync {
    /// Fixed type of this instance
    fn classifier_type(&self) -> ClassifierType;

    /// Inspect one packet and return an updated verdict
    ///
    /// Implementations cache the returned response as their last response.
    fn process(&self, sender: Sender, ip_hdr: &IpHeader, payload: &[u8]) -> ProcessResponse;

    /// Contribute owned fields into an offload rule-create message
    ///
    /// Best effort, idempotent, must not fail. A classifier with nothing to
    /// contribute leaves the message alone.
    fn sync_to_offload(&self, rule: &mut RuleCreate) {
        let _ = rule;
    }

    /// Absorb a connection-sync message from the offload engine
    ///
    /// Called for every reason code on every sync; stale or superseded
    /// messages must be tolerated. A classifier that cannot apply a sync
    /// absorbs it and logs internally rather than failing outward.
    fn sync_from_offload(&self, sync: &ConnSync) {
        let _ = sync;
    }

    /// Whether this classifier supports re-evaluation
    fn reclassify_allowed(&self) -> bool {
        false
    }

    /// Begin re-evaluation: relevance returns to `Maybe` until the next
    /// process pass. Must be a no-op when `reclassify_allowed` is false.
    fn reclassify(&self) {}

    /// Most recent process response
    fn last_response(&self) -> ProcessResponse;

    /// Write a diagnostic record for the current state into `buf`
    ///
    /// Returns the exact byte count written. A return of `0` or of exactly
    /// `buf.len()` signals failure or truncation, matching the bounded
    /// formatting convention used throughout the diagnostic boundary.
    fn state_get(&self, buf: &mut [u8]) -> usize {
        diag::process_response_state(buf, &self.last_response())
    }
}

/// Lock-free cell caching a classifier's last process response
///
/// Stored behind `ArcSwap` so diagnostic readers never contend with the
/// process path.
#[derive(Debug)]
pub struct ResponseCell(ArcSwap<ProcessResponse>);

impl ResponseCell {
    /// New cell holding the default (`Maybe`, no actions) response
    pub fn new() -> Self {
        Self(ArcSwap::from_pointee(ProcessResponse::default()))
    }

    /// Replace the cached response
    #[inline]
    pub fn store(&self, response: ProcessResponse) {
        self.0.store(Arc::new(response));
    }

    /// Snapshot the cached response
    #[inline]
    pub fn load(&self) -> ProcessResponse {
        ProcessResponse::clone(&self.0.load())
    }
}

impl Default for ResponseCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_order_is_priority_order() {
        let mut sorted = ClassifierType::ALL;
        sorted.sort();
        assert_eq!(sorted, ClassifierType::ALL);
        assert_eq!(ClassifierType::ALL[0], ClassifierType::Default);
    }

    #[test]
    fn test_default_response_asserts_nothing() {
        let pr = ProcessResponse::default();
        assert_eq!(pr.relevance, Relevance::Maybe);
        assert!(pr.drop.is_none());
        assert!(pr.qos_tags.is_none());
        assert!(pr.accel_mode.is_none());
        assert!(pr.timer_group.is_none());
        assert!(pr.dscp.is_none());
        assert!(!pr.dscp_deny);
    }

    #[test]
    fn test_response_cell_snapshot() {
        let cell = ResponseCell::new();
        cell.store(ProcessResponse::relevant());
        assert_eq!(cell.load().relevance, Relevance::Yes);
    }
}
