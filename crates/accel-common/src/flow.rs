//! Flow identification types
//!
//! Connections are identified by a 5-tuple in "flow / return" orientation:
//! the flow side is the host that originated the connection, the return side
//! is its peer. Every packet on the connection is attributed to one sender
//! direction.

use std::net::{IpAddr, Ipv4Addr};

/// Ethernet MAC address
pub type MacAddr = [u8; 6];

/// Which endpoint sent the packet being processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    /// Packet sent by the connection originator
    Flow,
    /// Packet sent by the responder
    Return,
}

/// Connection 5-tuple, flow/return oriented
///
/// `ident` carries the L4 port for TCP/UDP and the protocol-specific key for
/// keyed encapsulations (e.g. the PPTP call ID), which is why it is wider
/// than a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowTuple {
    /// Originator address
    pub flow_ip: IpAddr,
    /// Originator ident (port or encapsulation key)
    pub flow_ident: u32,
    /// Responder address
    pub return_ip: IpAddr,
    /// Responder ident (port or encapsulation key)
    pub return_ident: u32,
    /// IP protocol number
    pub protocol: u8,
}

impl FlowTuple {
    /// Create a new tuple
    pub const fn new(
        flow_ip: IpAddr,
        flow_ident: u32,
        return_ip: IpAddr,
        return_ident: u32,
        protocol: u8,
    ) -> Self {
        Self {
            flow_ip,
            flow_ident,
            return_ip,
            return_ident,
            protocol,
        }
    }

    /// Convenience constructor for IPv4 tuples
    pub fn from_ipv4(
        flow_ip: Ipv4Addr,
        flow_ident: u32,
        return_ip: Ipv4Addr,
        return_ident: u32,
        protocol: u8,
    ) -> Self {
        Self::new(
            IpAddr::V4(flow_ip),
            flow_ident,
            IpAddr::V4(return_ip),
            return_ident,
            protocol,
        )
    }

    /// Tuple as seen from the opposite direction
    #[inline]
    pub fn reverse(&self) -> Self {
        Self {
            flow_ip: self.return_ip,
            flow_ident: self.return_ident,
            return_ip: self.flow_ip,
            return_ident: self.flow_ident,
            protocol: self.protocol,
        }
    }
}

/// Minimal parsed view of the IP header handed to classifiers
///
/// Classifiers never parse raw packets themselves; the front end parses once
/// and shares this view for the duration of one process pass.
#[derive(Debug, Clone, Copy)]
pub struct IpHeader {
    /// Source address of this packet
    pub src_addr: IpAddr,
    /// Destination address of this packet
    pub dest_addr: IpAddr,
    /// IP protocol number
    pub protocol: u8,
    /// DSCP field as received
    pub dscp: u8,
    /// Total length including the IP header
    pub total_len: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuple_reverse_involution() {
        let t = FlowTuple::from_ipv4(
            Ipv4Addr::new(192, 168, 1, 5),
            12345,
            Ipv4Addr::new(8, 8, 8, 8),
            443,
            6,
        );
        assert_eq!(t.reverse().reverse(), t);
        assert_ne!(t.reverse(), t);
    }
}
