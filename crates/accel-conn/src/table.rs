//! Concurrent connection table
//!
//! Keyed by 5-tuple in flow orientation; lookups also try the reverse
//! orientation so a packet from either endpoint resolves to the same
//! connection.

use std::sync::Arc;

use accel_common::{FlowTuple, Sender};
use dashmap::DashMap;

use crate::connection::Connection;

/// Shared table of tracked connections
#[derive(Default)]
pub struct ConnectionTable {
    map: DashMap<FlowTuple, Arc<Connection>>,
}

impl ConnectionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a connection. Returns the previous entry for the same tuple,
    /// if any.
    pub fn insert(&self, conn: Arc<Connection>) -> Option<Arc<Connection>> {
        self.map.insert(*conn.tuple(), conn)
    }

    /// Look up a connection by tuple, trying both orientations
    ///
    /// Returns the connection together with the direction the given tuple
    /// corresponds to.
    pub fn lookup(&self, tuple: &FlowTuple) -> Option<(Arc<Connection>, Sender)> {
        if let Some(conn) = self.map.get(tuple) {
            return Some((Arc::clone(&conn), Sender::Flow));
        }
        let reverse = tuple.reverse();
        self.map
            .get(&reverse)
            .map(|conn| (Arc::clone(&conn), Sender::Return))
    }

    /// Remove a connection by its flow-oriented tuple
    pub fn remove(&self, tuple: &FlowTuple) -> Option<Arc<Connection>> {
        self.map.remove(tuple).map(|(_, conn)| conn)
    }

    /// Number of tracked connections
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
