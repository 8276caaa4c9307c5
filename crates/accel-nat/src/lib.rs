//! NAT boundary for keyed encapsulation protocols
//!
//! GRE has no ports, so NAT for it leans on the optional key field; PPTP's
//! flavor of GRE makes that key mandatory as the call ID. Two services live
//! here:
//!
//! - [`KeyAllocator`]: picks a key not already in use for a translated
//!   tuple, cycling candidates from a rotating counter so consecutive
//!   connections do not pile onto the same keys.
//! - [`manip_packet`]: rewrites the call ID embedded in an in-flight PPTP
//!   GRE packet. Only the destination side is ever rewritten because the
//!   source key does not appear in the packet at all.

#![warn(missing_docs)]

pub mod gre;

pub use gre::{manip_packet, ManipType, VersionPolicy, GRE_VERSION_ORIGINAL, GRE_VERSION_PPTP};

use std::sync::atomic::{AtomicU16, Ordering};

use accel_common::FlowTuple;
use tracing::debug;

/// NAT boundary failure; the packet or connection falls back to unmodified
/// handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NatError {
    /// No free key in the requested range
    #[error("no free key in range")]
    AllocationExhausted,
    /// Packet too short to carry the header being rewritten
    #[error("encapsulation header truncated")]
    TruncatedHeader,
    /// GRE version this helper does not understand
    #[error("unknown GRE version {0}")]
    UnknownVersion(u8),
}

/// Candidate key range `[min, min + size)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRange {
    /// Lowest candidate key
    pub min: u16,
    /// Number of candidate keys
    pub size: u16,
}

impl KeyRange {
    /// The range used when the caller does not constrain keys: every
    /// nonzero 16-bit value
    pub const FULL: KeyRange = KeyRange {
        min: 1,
        size: u16::MAX,
    };
}

impl Default for KeyRange {
    fn default() -> Self {
        Self::FULL
    }
}

/// Rotating unique-key allocator
///
/// The counter is shared across all allocations from this instance, so
/// successive connections start probing at different offsets instead of all
/// contending for `min`.
#[derive(Debug, Default)]
pub struct KeyAllocator {
    counter: AtomicU16,
}

impl KeyAllocator {
    /// Create an allocator with its counter at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a key in `range` that `in_use` does not report taken
    ///
    /// Tries `range.size` candidates starting from the rotating counter.
    pub fn allocate<F>(&self, range: KeyRange, in_use: F) -> Result<u16, NatError>
    where
        F: Fn(u16) -> bool,
    {
        if range.size == 0 {
            return Err(NatError::AllocationExhausted);
        }

        for _ in 0..range.size {
            let offset = self.counter.fetch_add(1, Ordering::Relaxed);
            let key = range.min.wrapping_add(offset % range.size);
            if !in_use(key) {
                return Ok(key);
            }
        }

        debug!(min = range.min, size = range.size, "no free key in range");
        Err(NatError::AllocationExhausted)
    }

    /// Write a free key into the side of `tuple` being translated
    ///
    /// Candidates are probed by rewriting the tuple in place and asking
    /// `in_use` about the whole candidate tuple, so two connections may
    /// share a key as long as the rest of the tuple differs. On exhaustion
    /// the tuple is left holding the last candidate tried; callers fall
    /// back to dropping the connection.
    pub fn allocate_tuple<F>(
        &self,
        tuple: &mut FlowTuple,
        manip: ManipType,
        range: KeyRange,
        in_use: F,
    ) -> Result<u16, NatError>
    where
        F: Fn(&FlowTuple) -> bool,
    {
        if range.size == 0 {
            return Err(NatError::AllocationExhausted);
        }

        for _ in 0..range.size {
            let offset = self.counter.fetch_add(1, Ordering::Relaxed);
            let key = range.min.wrapping_add(offset % range.size);
            match manip {
                ManipType::Src => tuple.flow_ident = u32::from(key),
                ManipType::Dst => tuple.return_ident = u32::from(key),
            }
            if !in_use(tuple) {
                return Ok(key);
            }
        }

        debug!(min = range.min, size = range.size, "no free key for tuple");
        Err(NatError::AllocationExhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_allocates_only_free_key() {
        let alloc = KeyAllocator::new();
        let taken: HashSet<u16> = [1, 2, 3, 5].into_iter().collect();
        let range = KeyRange { min: 1, size: 5 };

        let key = alloc.allocate(range, |k| taken.contains(&k)).unwrap();
        assert_eq!(key, 4);
    }

    #[test]
    fn test_exhausted_range() {
        let alloc = KeyAllocator::new();
        let taken: HashSet<u16> = [1, 2, 3, 4, 5].into_iter().collect();
        let range = KeyRange { min: 1, size: 5 };

        let err = alloc.allocate(range, |k| taken.contains(&k)).unwrap_err();
        assert_eq!(err, NatError::AllocationExhausted);
    }

    #[test]
    fn test_counter_rotates_between_allocations() {
        let alloc = KeyAllocator::new();
        let range = KeyRange { min: 10, size: 100 };
        let a = alloc.allocate(range, |_| false).unwrap();
        let b = alloc.allocate(range, |_| false).unwrap();
        assert_ne!(a, b);
        assert!((10..110).contains(&a));
        assert!((10..110).contains(&b));
    }

    #[test]
    fn test_empty_range_exhausts_immediately() {
        let alloc = KeyAllocator::new();
        let err = alloc
            .allocate(KeyRange { min: 1, size: 0 }, |_| false)
            .unwrap_err();
        assert_eq!(err, NatError::AllocationExhausted);
    }

    fn pptp_tuple() -> FlowTuple {
        FlowTuple::from_ipv4(
            "192.168.1.2".parse().unwrap(),
            0,
            "10.0.0.1".parse().unwrap(),
            0,
            47,
        )
    }

    #[test]
    fn test_allocate_tuple_writes_dst_ident() {
        let alloc = KeyAllocator::new();
        let mut tuple = pptp_tuple();
        let range = KeyRange { min: 1, size: 5 };

        let key = alloc
            .allocate_tuple(&mut tuple, ManipType::Dst, range, |_| false)
            .unwrap();
        assert_eq!(tuple.return_ident, u32::from(key));
        assert_eq!(tuple.flow_ident, 0);
    }

    #[test]
    fn test_allocate_tuple_skips_taken_tuples() {
        let alloc = KeyAllocator::new();
        let mut taken = pptp_tuple();
        taken.flow_ident = 1;
        let mut tuple = pptp_tuple();
        let range = KeyRange { min: 1, size: 2 };

        let key = alloc
            .allocate_tuple(&mut tuple, ManipType::Src, range, |t| *t == taken)
            .unwrap();
        assert_eq!(key, 2);
        assert_eq!(tuple.flow_ident, 2);
    }

    #[test]
    fn test_allocate_tuple_exhaustion() {
        let alloc = KeyAllocator::new();
        let mut tuple = pptp_tuple();
        let range = KeyRange { min: 7, size: 3 };

        let err = alloc
            .allocate_tuple(&mut tuple, ManipType::Dst, range, |_| true)
            .unwrap_err();
        assert_eq!(err, NatError::AllocationExhausted);
        // the last probed candidate stays behind
        assert!((7..10).contains(&(tuple.return_ident as u16)));
    }

    #[test]
    fn test_full_range_default() {
        assert_eq!(KeyRange::default(), KeyRange::FULL);
        assert_eq!(KeyRange::FULL.min, 1);
    }
}
