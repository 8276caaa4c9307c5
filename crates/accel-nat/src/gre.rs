//! In-place GRE/PPTP header manipulation
//!
//! The PPTP flavor of GRE carries the call ID at a fixed offset; rewriting
//! it is the whole of GRE NAT. Plain GRE (version 0) passes through
//! unmodified, and unrecognized versions are handled per a configurable
//! policy: reject under `Strict`, pass untouched under `Permissive`.

use tracing::trace;

use crate::NatError;

/// Plain GRE per RFC 1701/2784
pub const GRE_VERSION_ORIGINAL: u8 = 0;
/// PPTP's enhanced GRE per RFC 2637
pub const GRE_VERSION_PPTP: u8 = 1;

// flags(1) version(1) protocol(2) payload_len(2) call_id(2); the two
// optional 32-bit fields that may follow are not required to be present.
const PPTP_HDR_LEN: usize = 8;
const VERSION_OFFSET: usize = 1;
const VERSION_MASK: u8 = 0x07;
const CALL_ID_OFFSET: usize = 6;

/// Which side of the tuple is being translated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManipType {
    /// Source translation; the source key is not present in the packet
    Src,
    /// Destination translation; rewrites the embedded call ID
    Dst,
}

/// What to do with GRE versions this helper does not understand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionPolicy {
    /// Reject the packet
    #[default]
    Strict,
    /// Pass the packet through unmodified
    Permissive,
}

/// Rewrite the call ID of a GRE packet in place
///
/// `gre` must be the packet's mutable GRE header view, starting at the GRE
/// flags byte. Length and writability are the caller's explicit
/// precondition; a view shorter than the mandatory PPTP header is rejected
/// rather than partially written.
///
/// Returns `Ok(true)` if the packet may proceed (rewritten or deliberately
/// untouched), an error if it must fall back to unmodified handling.
pub fn manip_packet(
    gre: &mut [u8],
    call_id: u16,
    manip: ManipType,
    policy: VersionPolicy,
) -> Result<bool, NatError> {
    if gre.len() < PPTP_HDR_LEN {
        return Err(NatError::TruncatedHeader);
    }

    // Only destination manipulation touches the packet: the source key has
    // no on-the-wire representation.
    if manip != ManipType::Dst {
        return Ok(true);
    }

    let version = gre[VERSION_OFFSET] & VERSION_MASK;
    match version {
        GRE_VERSION_ORIGINAL => {
            // Plain GRE is not NATed; behave like an unknown-protocol
            // helper and leave it alone.
            Ok(true)
        }
        GRE_VERSION_PPTP => {
            trace!(call_id, "rewriting PPTP call ID");
            gre[CALL_ID_OFFSET..CALL_ID_OFFSET + 2].copy_from_slice(&call_id.to_be_bytes());
            Ok(true)
        }
        version => match policy {
            VersionPolicy::Strict => Err(NatError::UnknownVersion(version)),
            VersionPolicy::Permissive => {
                trace!(version, "passing unknown GRE version per policy");
                Ok(true)
            }
        },
    }
}
