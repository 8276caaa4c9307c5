//! Connection record and per-packet decision pass
//!
//! A connection owns its classifier chain and an acceleration state. The
//! chain is mutated and walked only under the connection lock; classifier
//! references taken from a snapshot may be used outside it (diagnostics,
//! sync dispatch) because instance lifetime is carried by `Arc`.

use std::sync::Arc;

use accel_classifier::{
    merge, ChainError, Classifier, ClassifierChain, ClassifierType, MergedDecision,
    ProcessResponse, Relevance,
};
use accel_common::{FlowTuple, IpHeader, Sender};
use accel_offload::{
    ChannelError, ConnSync, ConnectionRule, OffloadChannel, RuleDestroy, SyncReason,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::bridge::{self, BridgeError};

/// Where the connection's packets are being forwarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccelState {
    /// Every packet passes through software forwarding
    SoftwareOnly,
    /// A rule-create message has been submitted, awaiting the engine
    AccelPending,
    /// The offload engine owns forwarding for this connection
    Accelerated,
}

/// Acceleration attempt failure; the connection stays in software forwarding
#[derive(Debug, thiserror::Error)]
pub enum AccelError {
    /// The merged decision does not permit acceleration
    #[error("acceleration not permitted by classifier decision")]
    NotPermitted,
    /// The sync bridge could not assemble a complete rule
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    /// The offload channel refused the message
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

struct ConnState {
    chain: ClassifierChain,
    accel: AccelState,
}

/// One tracked connection
pub struct Connection {
    tuple: FlowTuple,
    // None until the interface hierarchy for both directions is resolved.
    conn_rule: RwLock<Option<ConnectionRule>>,
    state: Mutex<ConnState>,
}

impl Connection {
    /// Create a connection with its initial chain (from the registry)
    pub fn new(tuple: FlowTuple, chain: ClassifierChain) -> Self {
        Self {
            tuple,
            conn_rule: RwLock::new(None),
            state: Mutex::new(ConnState {
                chain,
                accel: AccelState::SoftwareOnly,
            }),
        }
    }

    /// The connection's 5-tuple
    pub fn tuple(&self) -> &FlowTuple {
        &self.tuple
    }

    /// Record the resolved interface/MTU/MAC fields
    pub fn set_connection_rule(&self, rule: ConnectionRule) {
        *self.conn_rule.write() = Some(rule);
    }

    /// Current acceleration state
    pub fn accel_state(&self) -> AccelState {
        self.state.lock().accel
    }

    /// Assign an additional classifier to the chain
    pub fn assign(&self, classifier: Arc<dyn Classifier>) -> Result<(), ChainError> {
        self.state.lock().chain.assign(classifier)
    }

    /// Unassign a classifier from the chain
    pub fn unassign(&self, ty: ClassifierType) -> Result<(), ChainError> {
        self.state.lock().chain.unassign(ty)
    }

    /// Find an assigned classifier by type
    pub fn find(&self, ty: ClassifierType) -> Option<Arc<dyn Classifier>> {
        self.state.lock().chain.find(ty)
    }

    /// Snapshot of the chain, ascending by type
    pub fn assigned(&self) -> Vec<Arc<dyn Classifier>> {
        self.state.lock().chain.assigned()
    }

    /// Run one decision pass for a packet
    ///
    /// Invokes `process()` on every assigned classifier in ascending
    /// priority order, merges the responses, and unassigns classifiers that
    /// answered `No`. The whole pass runs under the connection lock so each
    /// classifier's cached response stays consistent with the chain
    /// composition it was produced under.
    pub fn process_packet(
        &self,
        sender: Sender,
        ip_hdr: &IpHeader,
        payload: &[u8],
    ) -> MergedDecision {
        let mut state = self.state.lock();

        let snapshot = state.chain.assigned();
        let mut responses: Vec<(ClassifierType, ProcessResponse)> =
            Vec::with_capacity(snapshot.len());
        for classifier in &snapshot {
            let pr = classifier.process(sender, ip_hdr, payload);
            responses.push((classifier.classifier_type(), pr));
        }

        let decision = merge(responses.iter().map(|(_, pr)| pr));

        // Relevance No is terminal: the classifier leaves the chain now.
        for (ty, pr) in &responses {
            if pr.relevance == Relevance::No {
                match state.chain.unassign(*ty) {
                    Ok(()) => debug!(classifier = ?ty, "unassigned: no longer relevant"),
                    // Default cannot be removed even if it were to answer No.
                    Err(err) => warn!(classifier = ?ty, %err, "unassign after No failed"),
                }
            }
        }

        decision
    }

    /// Request acceleration for this connection
    ///
    /// Builds the offload rule through the sync bridge and submits it. Any
    /// failure leaves the connection in software forwarding.
    pub fn accelerate(
        &self,
        decision: &MergedDecision,
        channel: &dyn OffloadChannel,
    ) -> Result<(), AccelError> {
        if !decision.permits_acceleration() {
            return Err(AccelError::NotPermitted);
        }

        let mut state = self.state.lock();
        if state.accel != AccelState::SoftwareOnly {
            return Ok(());
        }

        let conn_rule = *self.conn_rule.read();
        let rule =
            bridge::build_offload_rule(self.tuple, conn_rule, &state.chain.assigned(), decision)?;
        channel.submit_create(&rule)?;
        state.accel = AccelState::AccelPending;
        Ok(())
    }

    /// Confirm that the offload engine accepted the rule
    pub fn on_accel_established(&self) {
        let mut state = self.state.lock();
        if state.accel == AccelState::AccelPending {
            state.accel = AccelState::Accelerated;
        }
    }

    /// Stop accelerating this connection
    pub fn decelerate(&self, channel: &dyn OffloadChannel) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        if state.accel == AccelState::SoftwareOnly {
            return Ok(());
        }
        channel.submit_destroy(&RuleDestroy { tuple: self.tuple })?;
        state.accel = AccelState::SoftwareOnly;
        Ok(())
    }

    /// Route a sync message from the offload engine through the chain
    ///
    /// Terminal reasons also return the connection to software forwarding.
    pub fn on_offload_sync(&self, sync: &ConnSync) {
        let snapshot = self.state.lock().chain.assigned();
        bridge::dispatch_offload_sync(&snapshot, sync);

        match sync.reason {
            SyncReason::Stats => {}
            SyncReason::Flush
            | SyncReason::Evict
            | SyncReason::Destroy
            | SyncReason::PppoeDestroy => {
                let mut state = self.state.lock();
                debug!(tuple = ?self.tuple, reason = ?sync.reason,
                       "connection returned to software forwarding");
                state.accel = AccelState::SoftwareOnly;
            }
        }
    }
}
