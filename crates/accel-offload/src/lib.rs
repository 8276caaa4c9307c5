//! Offload engine boundary
//!
//! Message types exchanged with the hardware offload engine, and the opaque
//! channel they travel over. The transport itself (rings, interrupts,
//! firmware framing) is out of scope; the core only ever borrows a message
//! for the duration of one sync call.
//!
//! Field validity follows the producer-sets-flags convention: each optional
//! sub-record in a rule-create message is paired with a validity bit, and
//! the setters here keep bit and record consistent so a consumer can trust
//! the flags word alone.

#![warn(missing_docs)]

pub mod message;

pub use message::{
    ConnSync, ConnectionRule, DscpRule, PppoeRule, QosRule, RuleCreate, RuleDestroy, SyncReason,
    TcpRule, VlanRule,
};

/// Opaque channel to the offload engine
///
/// Implementations must be non-blocking and bounded-time; these calls run on
/// the packet-processing path. A rejected submission means the connection
/// stays in software forwarding, nothing worse.
pub trait OffloadChannel: Send + Sync {
    /// Submit a rule-create message. `Err` means the engine refused it.
    fn submit_create(&self, rule: &RuleCreate) -> Result<(), ChannelError>;

    /// Submit a rule-destroy message for an accelerated connection.
    fn submit_destroy(&self, rule: &RuleDestroy) -> Result<(), ChannelError>;
}

/// Channel submission failure
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Transport queue had no room for the message
    #[error("offload channel queue full")]
    QueueFull,
    /// Engine rejected the rule
    #[error("offload engine rejected rule: {0}")]
    Rejected(&'static str),
}
