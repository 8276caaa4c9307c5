//! Shared primitives for the connection acceleration manager
//!
//! This crate provides the value types every other crate builds on:
//! - Flow tuples and sender directions
//! - Parsed IP header views handed to classifiers
//! - Timestamps and lock-free counters for hot-path accounting

#![warn(missing_docs)]

pub mod flow;

pub use flow::{FlowTuple, IpHeader, MacAddr, Sender};

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic nanosecond timestamp for sub-microsecond timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Get current timestamp (nanoseconds since epoch)
    #[inline(always)]
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self(nanos)
    }

    /// Get nanoseconds value
    #[inline(always)]
    pub fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Seconds since epoch, the granularity diagnostic records report
    #[inline(always)]
    pub fn as_secs(&self) -> u64 {
        self.0 / 1_000_000_000
    }

    /// Duration since this timestamp in microseconds
    #[inline(always)]
    pub fn elapsed_micros(&self) -> u64 {
        Self::now().0.saturating_sub(self.0) / 1000
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self(0)
    }
}

/// High-performance counter for lock-free accounting
#[derive(Debug, Default)]
pub struct AtomicCounter(AtomicU64);

impl AtomicCounter {
    /// Create counter with initial value
    pub const fn new(value: u64) -> Self {
        Self(AtomicU64::new(value))
    }

    /// Increment by one
    #[inline(always)]
    pub fn inc(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// Add a delta
    #[inline(always)]
    pub fn add(&self, delta: u64) -> u64 {
        self.0.fetch_add(delta, Ordering::Relaxed)
    }

    /// Read current value
    #[inline(always)]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Connection timer group
///
/// Selects which inactivity timeout bucket a connection lives in. A
/// classifier can move a connection between groups through its process
/// response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[repr(u8)]
pub enum TimerGroup {
    /// Catch-all short timeout
    Generic = 0,
    /// Non-TCP flows with an established reverse path
    UdpGeneric = 1,
    /// TCP flows before the three-way handshake completes
    TcpShort = 2,
    /// Established TCP flows
    TcpEstablished = 3,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_ordering() {
        let a = Timestamp::now();
        let b = Timestamp::now();
        assert!(b >= a);
    }

    #[test]
    fn test_counter() {
        let c = AtomicCounter::new(0);
        c.inc();
        c.add(41);
        assert_eq!(c.get(), 42);
    }
}
