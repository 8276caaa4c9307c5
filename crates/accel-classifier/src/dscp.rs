//! DSCP classifier
//!
//! Provides DSCP inspection and remarking. With a remark rule installed the
//! connection's packets are remarked in both directions; without one the
//! classifier observes the DSCP values actually in use and asserts them, so
//! an accelerated connection keeps emitting what software forwarding
//! emitted.
//!
//! Only TCP and UDP connections are eligible; anything else makes the
//! classifier permanently irrelevant.

use std::fmt::Write;

use accel_common::{AtomicCounter, IpHeader, Sender};
use accel_offload::{ConnSync, DscpRule, RuleCreate};
use parking_lot::Mutex;

use crate::diag::BoundedWriter;
use crate::{Classifier, ClassifierType, DscpMarks, ProcessResponse, ResponseCell};

const IPPROTO_TCP: u8 = 6;
const IPPROTO_UDP: u8 = 17;

#[derive(Debug, Default)]
struct DscpState {
    remark: Option<DscpMarks>,
    observed_flow: Option<u8>,
    observed_return: Option<u8>,
}

/// DSCP inspection and remarking classifier
#[derive(Debug, Default)]
pub struct DscpClassifier {
    state: Mutex<DscpState>,
    last: ResponseCell,
    sync_count: AtomicCounter,
}

impl DscpClassifier {
    /// Create a new instance with no remark rule
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the remark rule
    pub fn set_remark(&self, marks: DscpMarks) {
        self.state.lock().remark = Some(marks);
    }

    /// Remove the remark rule; observed values apply again
    pub fn clear_remark(&self) {
        self.state.lock().remark = None;
    }
}

impl Classifier for DscpClassifier {
    fn classifier_type(&self) -> ClassifierType {
        ClassifierType::Dscp
    }

    fn process(&self, sender: Sender, ip_hdr: &IpHeader, _payload: &[u8]) -> ProcessResponse {
        if ip_hdr.protocol != IPPROTO_TCP && ip_hdr.protocol != IPPROTO_UDP {
            let response = ProcessResponse::not_relevant();
            self.last.store(response.clone());
            return response;
        }

        let mut state = self.state.lock();
        match sender {
            Sender::Flow => state.observed_flow = Some(ip_hdr.dscp),
            Sender::Return => state.observed_return = Some(ip_hdr.dscp),
        }

        let marks = state.remark.unwrap_or(DscpMarks {
            flow: state.observed_flow.unwrap_or(0),
            ret: state.observed_return.unwrap_or(0),
        });
        drop(state);

        let response = ProcessResponse {
            dscp: Some(marks),
            ..ProcessResponse::relevant()
        };
        self.last.store(response.clone());
        response
    }

    fn sync_to_offload(&self, rule: &mut RuleCreate) {
        if let Some(marks) = self.last.load().dscp {
            rule.set_dscp(DscpRule {
                flow_dscp: marks.flow,
                return_dscp: marks.ret,
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
        let mut state = self.state.lock();
        state.observed_flow = None;
        state.observed_return = None;
        drop(state);
        // Back to Maybe until the next process pass.
        self.last.store(ProcessResponse::default());
    }

    fn last_response(&self) -> ProcessResponse {
        self.last.load()
    }

    fn state_get(&self, buf: &mut [u8]) -> usize {
        let state = self.state.lock();
        let (remark, flow, ret) = (
            state.remark,
            state.observed_flow.unwrap_or(0),
            state.observed_return.unwrap_or(0),
        );
        drop(state);

        let mut w = BoundedWriter::new(buf);
        match remark {
            Some(marks) => {
                let _ = write!(
                    w,
                    "<dscp_classifier remark_flow=\"{}\" remark_return=\"{}\">\n",
                    marks.flow, marks.ret
                );
            }
            None => {
                let _ = write!(
                    w,
                    "<dscp_classifier observed_flow=\"{}\" observed_return=\"{}\">\n",
                    flow, ret
                );
            }
        }
        let pos = w.written();
        if w.is_truncated() {
            return buf.len();
        }
        let n = crate::diag::process_response_state(&mut buf[pos..], &self.last.load());
        if n == 0 || n == buf.len() - pos {
            return buf.len();
        }
        let mut w = BoundedWriter::new(&mut buf[pos + n..]);
        let _ = write!(w, "</dscp_classifier>\n");
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

    fn header(protocol: u8, dscp: u8) -> IpHeader {
        IpHeader {
            src_addr: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 5)),
            dest_addr: IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
            protocol,
            dscp,
            total_len: 64,
        }
    }

    #[test]
    fn test_remark_rule_wins() {
        let c = DscpClassifier::new();
        c.set_remark(DscpMarks { flow: 46, ret: 34 });
        let pr = c.process(Sender::Flow, &header(6, 0), &[]);
        assert_eq!(pr.relevance, Relevance::Yes);
        assert_eq!(pr.dscp, Some(DscpMarks { flow: 46, ret: 34 }));
    }

    #[test]
    fn test_observed_values_without_rule() {
        let c = DscpClassifier::new();
        c.process(Sender::Flow, &header(17, 10), &[]);
        let pr = c.process(Sender::Return, &header(17, 20), &[]);
        assert_eq!(pr.dscp, Some(DscpMarks { flow: 10, ret: 20 }));
    }

    #[test]
    fn test_non_l4_protocol_not_relevant() {
        let c = DscpClassifier::new();
        let pr = c.process(Sender::Flow, &header(47, 0), &[]);
        assert_eq!(pr.relevance, Relevance::No);
    }

    #[test]
    fn test_sync_to_writes_dscp_rule() {
        let c = DscpClassifier::new();
        c.set_remark(DscpMarks { flow: 46, ret: 46 });
        c.process(Sender::Flow, &header(6, 0), &[]);

        let mut rule = RuleCreate::new();
        c.sync_to_offload(&mut rule);
        assert_eq!(rule.dscp().unwrap().flow_dscp, 46);

        // Idempotent: a second pass leaves the same result.
        c.sync_to_offload(&mut rule);
        assert_eq!(rule.dscp().unwrap().flow_dscp, 46);
    }

    #[test]
    fn test_reclassify_returns_to_maybe() {
        let c = DscpClassifier::new();
        c.process(Sender::Flow, &header(6, 12), &[]);
        assert_eq!(c.last_response().relevance, Relevance::Yes);

        assert!(c.reclassify_allowed());
        c.reclassify();
        assert_eq!(c.last_response().relevance, Relevance::Maybe);

        // Next pass re-derives relevance.
        let pr = c.process(Sender::Flow, &header(6, 12), &[]);
        assert_eq!(pr.relevance, Relevance::Yes);
    }
}
