//! # courier-server
//!
//! Real-time presence and point-to-point message relay over WebSocket.
//!
//! - [`presence`]: in-memory user → connection registry
//! - [`relay`]: tagged relay events and the single dispatcher that applies them
//! - [`websocket`]: per-connection state, heartbeat, and the session loop
//! - [`server`]: Axum listener with `/ws`, `/health`, `/metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod presence;
pub mod relay;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use presence::PresenceRegistry;
pub use server::CourierServer;
