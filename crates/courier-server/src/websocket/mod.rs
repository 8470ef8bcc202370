//! WebSocket transport: per-connection state, the connection table, liveness, and the session loop.

pub mod connection;
pub mod heartbeat;
pub mod manager;
pub mod session;
