//! Sync bridge
//!
//! Two one-way passes over a connection's classifiers, both ascending:
//!
//! - `build_offload_rule` assembles a rule-create message. The mandatory
//!   fields (5-tuple, interfaces, MTUs, MACs) come from the connection
//!   record; classifiers then contribute the fields they own. Later
//!   classifiers may overwrite earlier contributions, the same priority
//!   convention the merge engine applies per action. The merged decision
//!   then vetoes: a DSCP deny strips whatever marks the pass wrote, so the
//!   rule handed to hardware never re-applies an action the decision
//!   withdrew.
//! - `dispatch_offload_sync` routes a returned sync message through every
//!   classifier unconditionally. Sync callbacks do not fail; a classifier
//!   that cannot apply a message absorbs it, so one classifier can never
//!   starve the rest of the pass.

use std::sync::Arc;

use accel_classifier::{Classifier, MergedDecision};
use accel_common::FlowTuple;
use accel_offload::{ConnSync, ConnectionRule, RuleCreate};
use tracing::{debug, trace};

/// Rule assembly failure: the connection falls back to software forwarding
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// A mandatory rule field was unset after the build pass
    #[error("incomplete offload rule: {0} unset")]
    IncompleteRule(&'static str),
}

/// Assemble a rule-create message for a connection
///
/// `classifiers` must be the connection's chain snapshot in ascending type
/// order. `conn_rule` is `None` while the connection's interface hierarchy
/// is still unresolved, which makes the rule incomplete by definition.
/// `decision` is the merged decision the caller is accelerating under; its
/// cross-cutting vetoes apply to the assembled rule as well.
pub fn build_offload_rule(
    tuple: FlowTuple,
    conn_rule: Option<ConnectionRule>,
    classifiers: &[Arc<dyn Classifier>],
    decision: &MergedDecision,
) -> Result<RuleCreate, BridgeError> {
    let mut rule = RuleCreate::new();
    rule.set_tuple(tuple);
    if let Some(conn_rule) = conn_rule {
        rule.set_connection(conn_rule);
    }

    for classifier in classifiers {
        classifier.sync_to_offload(&mut rule);
        trace!(classifier = ?classifier.classifier_type(),
               valid_flags = rule.valid_flags(), "sync-to pass");
    }

    // A classifier's sync-to callback knows only its own state, so a
    // lower-priority classifier may have written DSCP marks the merged
    // decision stripped. Hardware must see the decision, not the raw pass.
    if decision.dscp_denied && rule.dscp().is_some() {
        debug!("dscp sub-record stripped: deny asserted in merged decision");
        rule.clear_dscp();
    }

    // The chain can only add optional sub-records; the mandatory ones must
    // have come from the connection record.
    if rule.tuple().is_none() {
        return Err(BridgeError::IncompleteRule("tuple"));
    }
    let conn = rule
        .connection()
        .ok_or(BridgeError::IncompleteRule("connection"))?;
    if conn.flow_mtu == 0 || conn.return_mtu == 0 {
        debug!("offload rule rejected: interface MTUs unresolved");
        return Err(BridgeError::IncompleteRule("mtu"));
    }

    Ok(rule)
}

/// Route a connection-sync message through every classifier
///
/// Every classifier observes every reason code; the pass never
/// short-circuits.
pub fn dispatch_offload_sync(classifiers: &[Arc<dyn Classifier>], sync: &ConnSync) {
    for classifier in classifiers {
        classifier.sync_from_offload(sync);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accel_classifier::{
        ClassifierChain, DefaultClassifier, DscpClassifier, DscpMarks, NetlinkClassifier,
        QosTags,
    };
    use accel_classifier::netlink::NetlinkPolicy;
    use accel_common::{IpHeader, Sender};
    use accel_offload::SyncReason;
    use std::net::{IpAddr, Ipv4Addr};

    fn tuple() -> FlowTuple {
        FlowTuple::from_ipv4(
            Ipv4Addr::new(192, 168, 1, 5),
            12345,
            Ipv4Addr::new(8, 8, 8, 8),
            443,
            6,
        )
    }

    fn conn_rule() -> ConnectionRule {
        ConnectionRule {
            flow_mac: [0x02, 0, 0, 0, 0, 1],
            return_mac: [0x02, 0, 0, 0, 0, 2],
            flow_interface_num: 1,
            return_interface_num: 2,
            flow_mtu: 1500,
            return_mtu: 1500,
        }
    }

    fn header() -> IpHeader {
        IpHeader {
            src_addr: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 5)),
            dest_addr: IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
            protocol: 6,
            dscp: 12,
            total_len: 64,
        }
    }

    fn decision_for(chain: &[Arc<dyn Classifier>]) -> MergedDecision {
        let responses: Vec<_> = chain.iter().map(|c| c.last_response()).collect();
        accel_classifier::merge(responses.iter())
    }

    #[test]
    fn test_missing_connection_rule_is_incomplete() {
        let chain = ClassifierChain::new();
        let err = build_offload_rule(
            tuple(),
            None,
            &chain.assigned(),
            &MergedDecision::default(),
        )
        .unwrap_err();
        assert_eq!(err, BridgeError::IncompleteRule("connection"));
    }

    #[test]
    fn test_zero_mtu_is_incomplete() {
        let mut rule = conn_rule();
        rule.flow_mtu = 0;
        let err =
            build_offload_rule(tuple(), Some(rule), &[], &MergedDecision::default()).unwrap_err();
        assert_eq!(err, BridgeError::IncompleteRule("mtu"));
    }

    #[test]
    fn test_classifiers_contribute_fields() {
        let mut chain = ClassifierChain::new();
        chain.assign(Arc::new(DefaultClassifier::new())).unwrap();

        let dscp = Arc::new(DscpClassifier::new());
        dscp.set_remark(DscpMarks { flow: 46, ret: 46 });
        dscp.process(Sender::Flow, &header(), &[]);
        chain.assign(dscp).unwrap();

        let nl = Arc::new(NetlinkClassifier::new());
        nl.apply_policy(NetlinkPolicy {
            qos_tags: Some(QosTags { flow: 7, ret: 7 }),
            ..NetlinkPolicy::default()
        });
        nl.process(Sender::Flow, &header(), &[]);
        chain.assign(nl).unwrap();

        let snapshot = chain.assigned();
        let rule =
            build_offload_rule(tuple(), Some(conn_rule()), &snapshot, &decision_for(&snapshot))
                .unwrap();
        assert_eq!(rule.dscp().unwrap().flow_dscp, 46);
        assert_eq!(rule.qos().unwrap().flow_qos_tag, 7);
        assert_eq!(rule.connection().unwrap().flow_mtu, 1500);
    }

    #[test]
    fn test_dscp_deny_strips_rule_marks() {
        // chain = [Dscp(YES remark), Netlink(YES dscp_deny)]: the merge
        // strips the marks from the decision; the rule must agree.
        let dscp = Arc::new(DscpClassifier::new());
        dscp.set_remark(DscpMarks { flow: 46, ret: 46 });
        dscp.process(Sender::Flow, &header(), &[]);

        let nl = Arc::new(NetlinkClassifier::new());
        nl.apply_policy(NetlinkPolicy {
            dscp_deny: true,
            ..NetlinkPolicy::default()
        });
        nl.process(Sender::Flow, &header(), &[]);

        let chain: Vec<Arc<dyn Classifier>> = vec![dscp, nl];
        let decision = decision_for(&chain);
        assert!(decision.dscp_denied && decision.dscp.is_none());

        let rule = build_offload_rule(tuple(), Some(conn_rule()), &chain, &decision).unwrap();
        assert!(rule.dscp().is_none());
    }

    #[test]
    fn test_build_then_dispatch_round_trip() {
        // Fields a classifier wrote during the build survive in classifier
        // state across a stats sync, not just in the transient message.
        let dscp = Arc::new(DscpClassifier::new());
        dscp.set_remark(DscpMarks { flow: 40, ret: 41 });
        dscp.process(Sender::Flow, &header(), &[]);
        let chain: Vec<Arc<dyn Classifier>> =
            vec![Arc::new(DefaultClassifier::new()), dscp.clone()];

        let decision = decision_for(&chain);
        let rule = build_offload_rule(tuple(), Some(conn_rule()), &chain, &decision).unwrap();
        assert_eq!(rule.dscp().unwrap().flow_dscp, 40);

        dispatch_offload_sync(&chain, &ConnSync::empty(tuple(), SyncReason::Stats));

        // Rebuilding yields the same contribution.
        let rebuilt = build_offload_rule(tuple(), Some(conn_rule()), &chain, &decision).unwrap();
        assert_eq!(rebuilt.dscp().unwrap().flow_dscp, 40);
        assert_eq!(rebuilt.dscp().unwrap().return_dscp, 41);
    }

    #[test]
    fn test_dispatch_reaches_every_classifier() {
        let a = Arc::new(DefaultClassifier::new());
        let b = Arc::new(DefaultClassifier::new());
        let chain: Vec<Arc<dyn Classifier>> = vec![a.clone(), b.clone()];

        let mut sync = ConnSync::empty(tuple(), SyncReason::Stats);
        sync.flow_packet_count = 5;
        dispatch_offload_sync(&chain, &sync);

        assert_eq!(a.accel_packets().0, 5);
        assert_eq!(b.accel_packets().0, 5);
    }
}
