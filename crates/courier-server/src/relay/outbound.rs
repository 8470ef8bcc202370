//! The transport seam the dispatcher sends through.

use courier_core::ConnectionId;
use serde_json::Value;

/// Send side of the transport, keyed by connection.
///
/// Implemented by [`ConnectionManager`](crate::websocket::manager::ConnectionManager);
/// tests substitute a recorder.
pub trait Outbound: Send + Sync {
    /// Queue `payload` for `connection` under `event`.
    ///
    /// Returns `false` when the connection is unknown, closed, or its send
    /// queue is full. Never blocks.
    fn send_to(&self, connection: &ConnectionId, event: &str, payload: &Value) -> bool;

    /// Whether `connection` is currently open.
    fn is_open(&self, connection: &ConnectionId) -> bool;
}
