//! Offload rule and sync message types
//!
//! One message family covers both IPv4 and IPv6 connections; addresses are
//! carried as `IpAddr` inside the tuple. Optional sub-records are gated by
//! validity bits in `RuleCreate::valid_flags`, set only through the typed
//! setters so the flags word and the records can never disagree.

use accel_common::{FlowTuple, MacAddr};

/// Connection sub-record is valid
pub const VALID_CONN: u16 = 0x01;
/// TCP window sub-record is valid
pub const VALID_TCP: u16 = 0x02;
/// PPPoE sub-record is valid
pub const VALID_PPPOE: u16 = 0x04;
/// QoS sub-record is valid
pub const VALID_QOS: u16 = 0x08;
/// VLAN sub-record is valid
pub const VALID_VLAN: u16 = 0x10;
/// DSCP marking sub-record is valid
pub const VALID_DSCP: u16 = 0x20;

/// Basic connection sub-record: interfaces, MTUs, MAC addresses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionRule {
    /// Flow direction source MAC
    pub flow_mac: MacAddr,
    /// Return direction source MAC
    pub return_mac: MacAddr,
    /// Flow interface number
    pub flow_interface_num: i32,
    /// Return interface number
    pub return_interface_num: i32,
    /// Flow interface MTU
    pub flow_mtu: u32,
    /// Return interface MTU
    pub return_mtu: u32,
}

/// TCP window tracking sub-record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpRule {
    /// Flow direction largest seen window
    pub flow_max_window: u32,
    /// Flow direction largest seen sequence + segment length
    pub flow_end: u32,
    /// Flow direction largest seen ack + max(1, win)
    pub flow_max_end: u32,
    /// Return direction largest seen window
    pub return_max_window: u32,
    /// Return direction largest seen sequence + segment length
    pub return_end: u32,
    /// Return direction largest seen ack + max(1, win)
    pub return_max_end: u32,
    /// Flow direction window scale factor
    pub flow_window_scale: u8,
    /// Return direction window scale factor
    pub return_window_scale: u8,
}

/// PPPoE session sub-record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PppoeRule {
    /// Flow direction PPPoE session ID
    pub flow_session_id: u16,
    /// Flow direction PPPoE server MAC
    pub flow_remote_mac: MacAddr,
    /// Return direction PPPoE session ID
    pub return_session_id: u16,
    /// Return direction PPPoE server MAC
    pub return_remote_mac: MacAddr,
}

/// QoS tag sub-record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QosRule {
    /// QoS tag for the flow direction
    pub flow_qos_tag: u32,
    /// QoS tag for the return direction
    pub return_qos_tag: u32,
}

/// DSCP remarking sub-record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DscpRule {
    /// Egress DSCP value for the flow direction
    pub flow_dscp: u8,
    /// Egress DSCP value for the return direction
    pub return_dscp: u8,
}

/// VLAN tag sub-record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VlanRule {
    /// VLAN tag expected on ingress packets
    pub ingress_vlan_tag: u32,
    /// VLAN tag applied to egress packets
    pub egress_vlan_tag: u32,
}

/// Rule-create message
///
/// The tuple and connection sub-record are mandatory and seeded by the sync
/// bridge from the connection record; everything else is contributed by
/// classifiers during the sync-to pass.
#[derive(Debug, Clone, Default)]
pub struct RuleCreate {
    valid_flags: u16,
    tuple: Option<FlowTuple>,
    conn: ConnectionRule,
    tcp: TcpRule,
    pppoe: PppoeRule,
    qos: QosRule,
    dscp: DscpRule,
    vlan_primary: VlanRule,
    vlan_secondary: VlanRule,
}

impl RuleCreate {
    /// Create an empty message with no valid fields
    pub fn new() -> Self {
        Self::default()
    }

    /// Current validity flags word
    #[inline]
    pub fn valid_flags(&self) -> u16 {
        self.valid_flags
    }

    /// Set the connection 5-tuple
    pub fn set_tuple(&mut self, tuple: FlowTuple) {
        self.tuple = Some(tuple);
    }

    /// The connection 5-tuple, if set
    pub fn tuple(&self) -> Option<&FlowTuple> {
        self.tuple.as_ref()
    }

    /// Set the basic connection sub-record
    pub fn set_connection(&mut self, conn: ConnectionRule) {
        self.conn = conn;
        self.valid_flags |= VALID_CONN;
    }

    /// Connection sub-record, if valid
    pub fn connection(&self) -> Option<&ConnectionRule> {
        (self.valid_flags & VALID_CONN != 0).then_some(&self.conn)
    }

    /// Set the TCP window sub-record
    pub fn set_tcp(&mut self, tcp: TcpRule) {
        self.tcp = tcp;
        self.valid_flags |= VALID_TCP;
    }

    /// TCP window sub-record, if valid
    pub fn tcp(&self) -> Option<&TcpRule> {
        (self.valid_flags & VALID_TCP != 0).then_some(&self.tcp)
    }

    /// Set the PPPoE sub-record
    pub fn set_pppoe(&mut self, pppoe: PppoeRule) {
        self.pppoe = pppoe;
        self.valid_flags |= VALID_PPPOE;
    }

    /// PPPoE sub-record, if valid
    pub fn pppoe(&self) -> Option<&PppoeRule> {
        (self.valid_flags & VALID_PPPOE != 0).then_some(&self.pppoe)
    }

    /// Set the QoS sub-record. Overwrites any earlier contribution.
    pub fn set_qos(&mut self, qos: QosRule) {
        self.qos = qos;
        self.valid_flags |= VALID_QOS;
    }

    /// QoS sub-record, if valid
    pub fn qos(&self) -> Option<&QosRule> {
        (self.valid_flags & VALID_QOS != 0).then_some(&self.qos)
    }

    /// Set the DSCP sub-record. Overwrites any earlier contribution.
    pub fn set_dscp(&mut self, dscp: DscpRule) {
        self.dscp = dscp;
        self.valid_flags |= VALID_DSCP;
    }

    /// DSCP sub-record, if valid
    pub fn dscp(&self) -> Option<&DscpRule> {
        (self.valid_flags & VALID_DSCP != 0).then_some(&self.dscp)
    }

    /// Clear the DSCP sub-record and its validity bit
    pub fn clear_dscp(&mut self) {
        self.dscp = DscpRule::default();
        self.valid_flags &= !VALID_DSCP;
    }

    /// Set the VLAN sub-records (primary mandatory, secondary for QinQ)
    pub fn set_vlan(&mut self, primary: VlanRule, secondary: Option<VlanRule>) {
        self.vlan_primary = primary;
        self.vlan_secondary = secondary.unwrap_or_default();
        self.valid_flags |= VALID_VLAN;
    }

    /// VLAN sub-records, if valid
    pub fn vlan(&self) -> Option<(&VlanRule, &VlanRule)> {
        (self.valid_flags & VALID_VLAN != 0).then_some((&self.vlan_primary, &self.vlan_secondary))
    }
}

/// Rule-destroy message: the tuple is the whole identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleDestroy {
    /// Tuple of the connection to stop accelerating
    pub tuple: FlowTuple,
}

/// Why the offload engine sent a connection-sync message
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum SyncReason {
    /// Periodic statistics refresh
    Stats,
    /// Engine flushed the cache entry
    Flush,
    /// Engine evicted the cache entry under pressure
    Evict,
    /// Host asked for the entry to be destroyed
    Destroy,
    /// Entry destroyed because its PPPoE session went away
    PppoeDestroy,
}

/// Connection-sync message returned by the offload engine
///
/// Counts are deltas since the previous sync for this connection, not
/// lifetime totals.
#[derive(Debug, Clone)]
pub struct ConnSync {
    /// Tuple identifying the connection
    pub tuple: FlowTuple,
    /// Reason the engine sent this sync
    pub reason: SyncReason,
    /// Flow direction largest seen window
    pub flow_max_window: u32,
    /// Flow direction largest seen sequence + segment length
    pub flow_end: u32,
    /// Flow direction largest seen ack + max(1, win)
    pub flow_max_end: u32,
    /// Return direction largest seen window
    pub return_max_window: u32,
    /// Return direction largest seen sequence + segment length
    pub return_end: u32,
    /// Return direction largest seen ack + max(1, win)
    pub return_max_end: u32,
    /// Packets accelerated in the flow direction since the last sync
    pub flow_packet_count: u32,
    /// Bytes accelerated in the flow direction since the last sync
    pub flow_byte_count: u32,
    /// Packets accelerated in the return direction since the last sync
    pub return_packet_count: u32,
    /// Bytes accelerated in the return direction since the last sync
    pub return_byte_count: u32,
    /// QoS tag the engine applied
    pub qos_tag: u32,
    /// Engine ticks elapsed since the previous sync
    pub inc_ticks: u32,
}

impl ConnSync {
    /// A sync carrying no traffic deltas, useful for reason-only events
    pub fn empty(tuple: FlowTuple, reason: SyncReason) -> Self {
        Self {
            tuple,
            reason,
            flow_max_window: 0,
            flow_end: 0,
            flow_max_end: 0,
            return_max_window: 0,
            return_end: 0,
            return_max_end: 0,
            flow_packet_count: 0,
            flow_byte_count: 0,
            return_packet_count: 0,
            return_byte_count: 0,
            qos_tag: 0,
            inc_ticks: 0,
        }
    }
}
