//! Merge / decision engine
//!
//! Folds the chain's latest process responses into one effective decision
//! for the front end. Two passes:
//!
//! 1. Responses with relevance `No` are excluded; the front end unassigns
//!    those classifiers after the pass.
//! 2. For each action independently, the highest-priority relevant
//!    classifier that asserts it wins. Responses arrive ascending, so a
//!    simple forward fold with later-overrides-earlier implements the
//!    priority rule. Actions are orthogonal: a low-priority QoS tag
//!    coexists with a high-priority DSCP mark.
//!
//! Cross-cutting rules sit outside the per-action fold: any relevant
//! `dscp_deny` strips DSCP marks entirely, and any relevant `drop = true`
//! makes the decision a drop regardless of everything else.
//!
//! A `Maybe` response asserts no actions. A connection whose chain holds
//! only `Maybe` classifiers ends up with acceleration denied: `DontCare`
//! permits acceleration only when at least one classifier answered `Yes`.

use crate::{AccelMode, DscpMarks, ProcessResponse, QosTags, Relevance};
use accel_common::TimerGroup;

/// The effective, priority-resolved decision for a connection
///
/// Derived on demand from the chain's responses, never stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedDecision {
    /// `Yes` if any relevant classifier answered `Yes`, else `Maybe`
    pub relevance: Relevance,
    /// Drop the packet at hand
    pub drop: bool,
    /// QoS tags to apply, if any classifier asserted them
    pub qos_tags: Option<QosTags>,
    /// Resolved acceleration mode
    pub accel_mode: AccelMode,
    /// Timer group to move the connection to, if asserted
    pub timer_group: Option<TimerGroup>,
    /// DSCP marks to apply; always `None` when a deny was asserted
    pub dscp: Option<DscpMarks>,
    /// Whether some relevant classifier denied DSCP changes
    pub dscp_denied: bool,
}

impl MergedDecision {
    /// Whether the front end may request acceleration for this connection
    ///
    /// A dropped packet is never accelerated. `DontCare` counts as
    /// permission only when at least one classifier is positively relevant.
    pub fn permits_acceleration(&self) -> bool {
        if self.drop {
            return false;
        }
        match self.accel_mode {
            AccelMode::Accel => true,
            AccelMode::No => false,
            AccelMode::DontCare => self.relevance == Relevance::Yes,
        }
    }
}

/// Merge responses given in ascending priority order
///
/// `No` responses are skipped here; scheduling their classifiers for
/// unassignment is the caller's job (it knows which classifier produced
/// which response).
pub fn merge<'a, I>(responses: I) -> MergedDecision
where
    I: IntoIterator<Item = &'a ProcessResponse>,
{
    let mut decision = MergedDecision::default();
    let mut drop_asserted = false;

    for pr in responses {
        match pr.relevance {
            Relevance::No => continue,
            Relevance::Maybe => continue,
            Relevance::Yes => {}
        }

        decision.relevance = Relevance::Yes;

        // Per-action override: this response is higher priority than
        // everything folded so far.
        if let Some(drop) = pr.drop {
            drop_asserted = drop_asserted || drop;
            decision.drop = drop;
        }
        if let Some(tags) = pr.qos_tags {
            decision.qos_tags = Some(tags);
        }
        if let Some(mode) = pr.accel_mode {
            decision.accel_mode = mode;
        }
        if let Some(group) = pr.timer_group {
            decision.timer_group = Some(group);
        }
        if let Some(marks) = pr.dscp {
            decision.dscp = Some(marks);
        }
        decision.dscp_denied = decision.dscp_denied || pr.dscp_deny;
    }

    // Drop dominance: any relevant drop wins even over a higher-priority
    // drop = false.
    if drop_asserted {
        decision.drop = true;
    }

    // DSCP-deny dominance over any priority ordering.
    if decision.dscp_denied {
        decision.dscp = None;
    }

    decision
}
