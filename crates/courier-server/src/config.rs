//! Server configuration.

use std::time::Duration;

use courier_settings::ServerSettings;

use crate::errors::ServerError;

/// Runtime configuration for [`CourierServer`](crate::server::CourierServer).
///
/// The defaults bind an ephemeral loopback port, which suits tests; the
/// binary builds this from [`ServerSettings`] instead.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Only browser origin allowed to open a socket.
    pub allowed_origin: String,
    /// Upgrades are refused with 503 at this many open connections.
    pub max_connections: usize,
    /// Per-connection outbound queue depth.
    pub send_queue_capacity: usize,
    /// Ping interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Seconds of silence before a connection is closed.
    pub heartbeat_timeout_secs: u64,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl ServerConfig {
    /// `host:port` string handed to the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Ping interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Silence allowed before closing.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    /// Reject values the transport cannot run with.
    ///
    /// `max_connections` may be zero: the server then refuses every upgrade.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.send_queue_capacity == 0 {
            return Err(ServerError::InvalidConfig(
                "send_queue_capacity must be at least 1".into(),
            ));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ServerError::InvalidConfig(
                "heartbeat_interval_secs must be at least 1".into(),
            ));
        }
        if self.heartbeat_timeout_secs < self.heartbeat_interval_secs {
            return Err(ServerError::InvalidConfig(
                "heartbeat_timeout_secs must not be less than heartbeat_interval_secs".into(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(ServerError::InvalidConfig(
                "max_message_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            allowed_origin: "http://localhost:5173".into(),
            max_connections: 1024,
            send_queue_capacity: 256,
            heartbeat_interval_secs: 25,
            heartbeat_timeout_secs: 60,
            max_message_size: 1024 * 1024,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            allowed_origin: s.allowed_origin.clone(),
            max_connections: s.max_connections,
            send_queue_capacity: s.send_queue_capacity,
            heartbeat_interval_secs: s.heartbeat_interval_secs,
            heartbeat_timeout_secs: s.heartbeat_timeout_secs,
            max_message_size: s.max_message_size,
        }
    }
}
