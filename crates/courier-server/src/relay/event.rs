//! Events flowing from sessions to the dispatcher.

use courier_core::protocol::InboundMessage;
use courier_core::{ConnectionId, UserId};
use serde_json::Value;

/// A message addressed to one user. The payload is never inspected.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageEnvelope {
    /// Intended recipient.
    pub receiver: UserId,
    /// Opaque application payload.
    pub payload: Value,
}

/// Everything a session can tell the dispatcher.
#[derive(Clone, Debug, PartialEq)]
pub enum RelayEvent {
    /// The connection identifies itself as `user`.
    Register {
        /// Source connection.
        connection: ConnectionId,
        /// Claimed identity.
        user: UserId,
    },
    /// The connection wants `envelope` relayed.
    SendIntent {
        /// Source connection.
        connection: ConnectionId,
        /// Addressed payload.
        envelope: MessageEnvelope,
    },
    /// The connection has closed.
    Disconnect {
        /// The closed connection.
        connection: ConnectionId,
    },
}

impl RelayEvent {
    /// Wrap a decoded frame with the connection it arrived on.
    pub fn from_inbound(connection: ConnectionId, message: InboundMessage) -> Self {
        match message {
            InboundMessage::Register { user } => Self::Register { connection, user },
            InboundMessage::SendMessage { receiver, data } => Self::SendIntent {
                connection,
                envelope: MessageEnvelope {
                    receiver,
                    payload: data,
                },
            },
        }
    }

    /// Short name for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::SendIntent { .. } => "send_intent",
            Self::Disconnect { .. } => "disconnect",
        }
    }
}
