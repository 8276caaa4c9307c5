//! Parental control classifier
//!
//! Highest-priority classifier: enforces destination blocking decisions from
//! the parental control subsystem. The blocklist is authoritative on every
//! pass: blocked destinations get an unconditional drop, permitted ones a
//! positively-relevant response that asserts no actions.

use std::collections::HashSet;
use std::fmt::Write;
use std::net::IpAddr;

use accel_common::{AtomicCounter, IpHeader, Sender};
use accel_offload::ConnSync;
use parking_lot::RwLock;
use tracing::debug;

use crate::diag::BoundedWriter;
use crate::{Classifier, ClassifierType, ProcessResponse, ResponseCell};

/// Parental control subsystem classifier
#[derive(Debug)]
pub struct ParentalControlClassifier {
    enabled: bool,
    blocked: RwLock<HashSet<IpAddr>>,
    drops: AtomicCounter,
    last: ResponseCell,
}

impl ParentalControlClassifier {
    /// Create a new instance. A disabled instance reports not-relevant on
    /// its first process pass and leaves the chain.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            blocked: RwLock::new(HashSet::new()),
            drops: AtomicCounter::new(0),
            last: ResponseCell::new(),
        }
    }

    /// Block a destination address
    pub fn block(&self, addr: IpAddr) {
        self.blocked.write().insert(addr);
    }

    /// Unblock a destination address
    pub fn unblock(&self, addr: IpAddr) {
        self.blocked.write().remove(&addr);
    }

    /// Packets dropped by this classifier so far
    pub fn drop_count(&self) -> u64 {
        self.drops.get()
    }
}

impl Classifier for ParentalControlClassifier {
    fn classifier_type(&self) -> ClassifierType {
        ClassifierType::ParentalControl
    }

    fn process(&self, sender: Sender, ip_hdr: &IpHeader, _payload: &[u8]) -> ProcessResponse {
        if !self.enabled {
            let response = ProcessResponse::not_relevant();
            self.last.store(response.clone());
            return response;
        }

        // The remote endpoint is the packet destination for flow-direction
        // packets and the source for return-direction packets.
        let remote = match sender {
            Sender::Flow => ip_hdr.dest_addr,
            Sender::Return => ip_hdr.src_addr,
        };

        let blocked = self.blocked.read().contains(&remote);
        let response = if blocked {
            self.drops.inc();
            debug!(%remote, "parental control drop");
            ProcessResponse {
                drop: Some(true),
                ..ProcessResponse::relevant()
            }
        } else {
            ProcessResponse::relevant()
        };
        self.last.store(response.clone());
        response
    }

    fn sync_from_offload(&self, _sync: &ConnSync) {
        // Nothing to fold back; blocked connections never reach the engine.
    }

    fn last_response(&self) -> ProcessResponse {
        self.last.load()
    }

    fn state_get(&self, buf: &mut [u8]) -> usize {
        let mut w = BoundedWriter::new(buf);
        let _ = write!(
            w,
            "<pcc_classifier enabled=\"{}\" blocked=\"{}\" drops=\"{}\">\n",
            if self.enabled { "yes" } else { "no" },
            self.blocked.read().len(),
            self.drops.get()
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
        let _ = write!(w, "</pcc_classifier>\n");
        if w.is_truncated() {
            return buf.len();
        }
        pos + n + w.written()
    }
}
