//! Server startup errors.

use thiserror::Error;

/// Failures that stop the server from starting. Nothing after startup is fatal.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was attempted.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configured origin is not a valid header value.
    #[error("invalid allowed origin `{0}`")]
    InvalidOrigin(String),

    /// A config value the transport cannot run with.
    #[error("invalid server config: {0}")]
    InvalidConfig(String),

    /// `listen` was called a second time.
    #[error("server is already listening")]
    AlreadyListening,

    /// The global metrics recorder could not be installed.
    #[error("failed to install metrics recorder: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    /// Other socket I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_names_address() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:4000".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        let msg = err.to_string();
        assert!(msg.contains("127.0.0.1:4000"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn invalid_origin_display() {
        let err = ServerError::InvalidOrigin("bad\norigin".into());
        assert!(err.to_string().starts_with("invalid allowed origin"));
    }
}
