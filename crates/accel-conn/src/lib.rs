//! Connection front end
//!
//! Ties the classifier chain to real connections: runs the per-packet
//! decision pass under the connection lock, bridges classifier state into
//! offload rule messages and hardware sync messages back into classifier
//! state, and tracks connections in a concurrent table.

#![warn(missing_docs)]

pub mod bridge;
pub mod connection;
pub mod table;

pub use bridge::{build_offload_rule, dispatch_offload_sync, BridgeError};
pub use connection::{AccelError, AccelState, Connection};
pub use table::ConnectionTable;
