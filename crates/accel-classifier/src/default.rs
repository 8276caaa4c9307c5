//! Default classifier
//!
//! The baseline opinion present on every connection: immediately relevant,
//! happy for the connection to be accelerated, and the authority on which
//! timer group the connection belongs to. It also keeps the connection's
//! accelerated traffic totals, folded in from offload sync messages.

use std::fmt::Write;

use accel_common::{AtomicCounter, IpHeader, Sender, TimerGroup};
use accel_offload::{ConnSync, SyncReason};
use tracing::trace;

use crate::diag::BoundedWriter;
use crate::{AccelMode, Classifier, ClassifierType, ProcessResponse, ResponseCell};

const IPPROTO_TCP: u8 = 6;

/// Baseline classifier, mandatory on every connection
#[derive(Debug, Default)]
pub struct DefaultClassifier {
    last: ResponseCell,
    // Accelerated traffic totals, accumulated across syncs.
    from_packets: AtomicCounter,
    from_bytes: AtomicCounter,
    to_packets: AtomicCounter,
    to_bytes: AtomicCounter,
    sync_count: AtomicCounter,
}

impl DefaultClassifier {
    /// Create a new instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Accelerated (flow, return) packet totals seen so far
    pub fn accel_packets(&self) -> (u64, u64) {
        (self.from_packets.get(), self.to_packets.get())
    }

    /// Accelerated (flow, return) byte totals seen so far
    pub fn accel_bytes(&self) -> (u64, u64) {
        (self.from_bytes.get(), self.to_bytes.get())
    }

    fn timer_group_for(protocol: u8) -> TimerGroup {
        if protocol == IPPROTO_TCP {
            TimerGroup::TcpEstablished
        } else {
            TimerGroup::UdpGeneric
        }
    }
}

impl Classifier for DefaultClassifier {
    fn classifier_type(&self) -> ClassifierType {
        ClassifierType::Default
    }

    fn process(&self, _sender: Sender, ip_hdr: &IpHeader, _payload: &[u8]) -> ProcessResponse {
        let response = ProcessResponse {
            accel_mode: Some(AccelMode::Accel),
            timer_group: Some(Self::timer_group_for(ip_hdr.protocol)),
            ..ProcessResponse::relevant()
        };
        self.last.store(response.clone());
        response
    }

    fn sync_from_offload(&self, sync: &ConnSync) {
        self.sync_count.inc();
        match sync.reason {
            SyncReason::Stats => {
                self.from_packets.add(sync.flow_packet_count as u64);
                self.from_bytes.add(sync.flow_byte_count as u64);
                self.to_packets.add(sync.return_packet_count as u64);
                self.to_bytes.add(sync.return_byte_count as u64);
            }
            // Terminal reasons may still carry final deltas.
            SyncReason::Flush
            | SyncReason::Evict
            | SyncReason::Destroy
            | SyncReason::PppoeDestroy => {
                self.from_packets.add(sync.flow_packet_count as u64);
                self.from_bytes.add(sync.flow_byte_count as u64);
                self.to_packets.add(sync.return_packet_count as u64);
                self.to_bytes.add(sync.return_byte_count as u64);
                trace!(reason = ?sync.reason, "connection left the offload engine");
            }
        }
    }

    fn last_response(&self) -> ProcessResponse {
        self.last.load()
    }

    fn state_get(&self, buf: &mut [u8]) -> usize {
        let mut w = BoundedWriter::new(buf);
        let _ = write!(
            w,
            "<default_classifier from_packets=\"{}\" from_bytes=\"{}\" \
             to_packets=\"{}\" to_bytes=\"{}\" syncs=\"{}\">\n",
            self.from_packets.get(),
            self.from_bytes.get(),
            self.to_packets.get(),
            self.to_bytes.get(),
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
        let _ = write!(w, "</default_classifier>\n");
        if w.is_truncated() {
            return buf.len();
        }
        pos + n + w.written()
    }
}
