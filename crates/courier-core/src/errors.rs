//! Errors raised while decoding inbound frames.

use thiserror::Error;

/// Why an inbound frame could not be turned into a relay event.
///
/// None of these are fatal: the session logs the error and discards the frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not a JSON object with an `event` field.
    #[error("invalid frame: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The `event` name is not one the relay understands.
    #[error("unknown event `{0}`")]
    UnknownEvent(String),

    /// A required field was absent, null, or empty.
    #[error("event `{event}` is missing required field `{field}`")]
    MissingField {
        /// Event name of the offending frame.
        event: &'static str,
        /// Wire name of the missing field.
        field: &'static str,
    },
}

impl ProtocolError {
    /// Short label used as a metrics dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "invalid_json",
            Self::UnknownEvent(_) => "unknown_event",
            Self::MissingField { .. } => "missing_field",
        }
    }
}
