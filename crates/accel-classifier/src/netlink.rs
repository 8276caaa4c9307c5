//! Netlink policy classifier
//!
//! Bridges an external control plane into the chain: userspace pushes a
//! policy verdict for a connection and this classifier asserts it on every
//! subsequent process pass. Until a verdict arrives the classifier stays at
//! `Maybe`, which by itself holds acceleration back.

use std::fmt::Write;

use accel_common::{AtomicCounter, IpHeader, Sender};
use accel_offload::{ConnSync, QosRule, RuleCreate};
use parking_lot::Mutex;
use tracing::debug;

use crate::diag::BoundedWriter;
use crate::{AccelMode, Classifier, ClassifierType, ProcessResponse, QosTags, ResponseCell};

/// Verdict pushed from userspace for one connection
#[derive(Debug, Clone, Copy, Default)]
pub struct NetlinkPolicy {
    /// QoS tags to assert
    pub qos_tags: Option<QosTags>,
    /// Acceleration desire to assert
    pub accel_mode: Option<AccelMode>,
    /// Deny DSCP changes on this connection
    pub dscp_deny: bool,
}

/// Externally fed policy classifier
#[derive(Debug, Default)]
pub struct NetlinkClassifier {
    policy: Mutex<Option<NetlinkPolicy>>,
    last: ResponseCell,
    sync_count: AtomicCounter,
}

impl NetlinkClassifier {
    /// Create a new instance with no policy installed
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the policy verdict for this connection
    pub fn apply_policy(&self, policy: NetlinkPolicy) {
        debug!(?policy, "netlink policy applied");
        *self.policy.lock() = Some(policy);
    }

    /// Withdraw the policy; the classifier reports not-relevant on the next
    /// pass and leaves the chain
    pub fn withdraw_policy(&self) {
        *self.policy.lock() = None;
    }

    fn has_policy(&self) -> bool {
        self.policy.lock().is_some()
    }
}

impl Classifier for NetlinkClassifier {
    fn classifier_type(&self) -> ClassifierType {
        ClassifierType::Netlink
    }

    fn process(&self, _sender: Sender, _ip_hdr: &IpHeader, _payload: &[u8]) -> ProcessResponse {
        let policy = *self.policy.lock();
        let response = match policy {
            // No verdict yet: stay undetermined.
            None if self.last.load().relevance == crate::Relevance::Maybe => {
                ProcessResponse::default()
            }
            // Had a verdict once, since withdrawn: leave the chain.
            None => ProcessResponse::not_relevant(),
            Some(policy) => ProcessResponse {
                qos_tags: policy.qos_tags,
                accel_mode: policy.accel_mode,
                dscp_deny: policy.dscp_deny,
                ..ProcessResponse::relevant()
            },
        };
        self.last.store(response.clone());
        response
    }

    fn sync_to_offload(&self, rule: &mut RuleCreate) {
        if let Some(tags) = self.last.load().qos_tags {
            rule.set_qos(QosRule {
                flow_qos_tag: tags.flow,
                return_qos_tag: tags.ret,
            });
        }
    }

    fn sync_from_offload(&self, _sync: &ConnSync) {
        self.sync_count.inc();
    }

    fn reclassify_allowed(&self) -> bool {
        true
    }

    fn reclassify(&self) {
        self.last.store(ProcessResponse::default());
    }

    fn last_response(&self) -> ProcessResponse {
        self.last.load()
    }

    fn state_get(&self, buf: &mut [u8]) -> usize {
        let mut w = BoundedWriter::new(buf);
        let _ = write!(
            w,
            "<nl_classifier policy=\"{}\" syncs=\"{}\">\n",
            if self.has_policy() { "yes" } else { "no" },
            self.sync_count.get()
        );
        let pos = w.written();
        if w.is_truncated() {
            return buf.len();
        }
        let n = crate::diag::process_response_state(&mut buf[pos..], &self.last.load());
        if n == 0 || n == buf.len() - pos {
            return buf.len();
        }
        let mut w = BoundedWriter::new(&mut buf[pos + n..]);
        let _ = write!(w, "</nl_classifier>\n");
        if w.is_truncated() {
            return buf.len();
        }
        pos + n + w.written()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Relevance;
    use std::net::{IpAddr, Ipv4Addr};

    fn header() -> IpHeader {
        IpHeader {
            src_addr: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 5)),
            dest_addr: IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
            protocol: 6,
            dscp: 0,
            total_len: 64,
        }
    }

    #[test]
    fn test_maybe_until_policy_arrives() {
        let c = NetlinkClassifier::new();
        let pr = c.process(Sender::Flow, &header(), &[]);
        assert_eq!(pr.relevance, Relevance::Maybe);
        assert!(pr.qos_tags.is_none());
    }

    #[test]
    fn test_policy_asserted_after_push() {
        let c = NetlinkClassifier::new();
        c.apply_policy(NetlinkPolicy {
            qos_tags: Some(QosTags { flow: 7, ret: 7 }),
            accel_mode: Some(AccelMode::Accel),
            dscp_deny: false,
        });
        let pr = c.process(Sender::Flow, &header(), &[]);
        assert_eq!(pr.relevance, Relevance::Yes);
        assert_eq!(pr.qos_tags, Some(QosTags { flow: 7, ret: 7 }));
        assert_eq!(pr.accel_mode, Some(AccelMode::Accel));
    }

    #[test]
    fn test_withdrawn_policy_terminates_relevance() {
        let c = NetlinkClassifier::new();
        c.apply_policy(NetlinkPolicy::default());
        c.process(Sender::Flow, &header(), &[]);

        c.withdraw_policy();
        let pr = c.process(Sender::Flow, &header(), &[]);
        assert_eq!(pr.relevance, Relevance::No);
    }

    #[test]
    fn test_sync_to_writes_qos_rule() {
        let c = NetlinkClassifier::new();
        c.apply_policy(NetlinkPolicy {
            qos_tags: Some(QosTags { flow: 3, ret: 4 }),
            ..NetlinkPolicy::default()
        });
        c.process(Sender::Flow, &header(), &[]);

        let mut rule = RuleCreate::new();
        c.sync_to_offload(&mut rule);
        let qos = rule.qos().unwrap();
        assert_eq!((qos.flow_qos_tag, qos.return_qos_tag), (3, 4));
    }
}
