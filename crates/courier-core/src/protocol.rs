//! Wire protocol.
//!
//! Every WebSocket text frame is a JSON object `{"event": <name>, "data": <payload>}`.
//!
//! | Direction | Event         | Payload                                  |
//! |-----------|---------------|------------------------------------------|
//! | inbound   | `newUser`     | `{"userId": string}` or a bare string    |
//! | inbound   | `sendMessage` | `{"receiverId": string, "data": any}`    |
//! | outbound  | `getMessage`  | the sender's `data`, verbatim            |
//! | outbound  | `connected`   | `{"connectionId": string, "timestamp"}`  |

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProtocolError;
use crate::ids::{ConnectionId, UserId};

/// Inbound: bind a user to the sending connection.
pub const EVENT_REGISTER: &str = "newUser";
/// Inbound: relay a payload to another user.
pub const EVENT_SEND_MESSAGE: &str = "sendMessage";
/// Outbound: a relayed payload.
pub const EVENT_RECEIVE_MESSAGE: &str = "getMessage";
/// Outbound: greeting sent once the session is open.
pub const EVENT_CONNECTED: &str = "connected";

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

/// A decoded inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundMessage {
    /// `newUser`: the sender is `user`.
    Register {
        /// Identity being claimed by the connection.
        user: UserId,
    },
    /// `sendMessage`: deliver `data` to `receiver` if online.
    SendMessage {
        /// Intended recipient.
        receiver: UserId,
        /// Opaque payload, `null` when omitted.
        data: Value,
    },
}

impl InboundMessage {
    /// Decode one text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let raw: RawFrame = serde_json::from_str(text)?;
        match raw.event.as_str() {
            EVENT_REGISTER => {
                let user = match raw.data {
                    Value::String(s) => non_empty(s),
                    Value::Object(mut map) => match map.remove("userId") {
                        Some(Value::String(s)) => non_empty(s),
                        _ => None,
                    },
                    _ => None,
                }
                .ok_or(ProtocolError::MissingField {
                    event: EVENT_REGISTER,
                    field: "userId",
                })?;
                Ok(Self::Register {
                    user: UserId::from(user),
                })
            }
            EVENT_SEND_MESSAGE => {
                let Value::Object(mut map) = raw.data else {
                    return Err(ProtocolError::MissingField {
                        event: EVENT_SEND_MESSAGE,
                        field: "receiverId",
                    });
                };
                let receiver = match map.remove("receiverId") {
                    Some(Value::String(s)) => non_empty(s),
                    _ => None,
                }
                .ok_or(ProtocolError::MissingField {
                    event: EVENT_SEND_MESSAGE,
                    field: "receiverId",
                })?;
                Ok(Self::SendMessage {
                    receiver: UserId::from(receiver),
                    data: map.remove("data").unwrap_or(Value::Null),
                })
            }
            _ => Err(ProtocolError::UnknownEvent(raw.event)),
        }
    }

    /// Wire name of the event.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Register { .. } => EVENT_REGISTER,
            Self::SendMessage { .. } => EVENT_SEND_MESSAGE,
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

/// An outbound frame, serialized as `{"event": .., "data": ..}`.
#[derive(Debug, Serialize)]
pub struct OutboundFrame<'a> {
    /// Event name.
    pub event: &'a str,
    /// Payload, forwarded as-is.
    pub data: &'a Value,
}

impl<'a> OutboundFrame<'a> {
    /// Build a frame borrowing its payload.
    pub fn new(event: &'a str, data: &'a Value) -> Self {
        Self { event, data }
    }

    /// Serialize to the text sent on the socket.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Payload of the `connected` greeting.
pub fn connected_payload(connection: &ConnectionId) -> Value {
    serde_json::json!({
        "connectionId": connection,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn register_with_object_payload() {
        let msg = InboundMessage::parse(r#"{"event":"newUser","data":{"userId":"A"}}"#).unwrap();
        assert_eq!(msg, InboundMessage::Register { user: "A".into() });
        assert_eq!(msg.event_name(), EVENT_REGISTER);
    }

    #[test]
    fn register_with_bare_string_payload() {
        let msg = InboundMessage::parse(r#"{"event":"newUser","data":"A"}"#).unwrap();
        assert_eq!(msg, InboundMessage::Register { user: "A".into() });
    }

    #[test]
    fn register_without_user_is_rejected() {
        let err = InboundMessage::parse(r#"{"event":"newUser","data":{}}"#).unwrap_err();
        assert_matches!(err, ProtocolError::MissingField { field: "userId", .. });
    }

    #[test]
    fn register_with_empty_user_is_rejected() {
        let err = InboundMessage::parse(r#"{"event":"newUser","data":""}"#).unwrap_err();
        assert_matches!(err, ProtocolError::MissingField { .. });
    }

    #[test]
    fn register_with_numeric_user_is_rejected() {
        let err = InboundMessage::parse(r#"{"event":"newUser","data":{"userId":7}}"#).unwrap_err();
        assert_matches!(err, ProtocolError::MissingField { .. });
    }

    #[test]
    fn send_message_keeps_payload_verbatim() {
        let text = r#"{"event":"sendMessage","data":{"receiverId":"B","data":{"text":"hi","n":[1,2,{"x":null}]}}}"#;
        let msg = InboundMessage::parse(text).unwrap();
        assert_eq!(
            msg,
            InboundMessage::SendMessage {
                receiver: "B".into(),
                data: json!({"text":"hi","n":[1,2,{"x":null}]}),
            }
        );
    }

    #[test]
    fn send_message_without_data_defaults_to_null() {
        let msg = InboundMessage::parse(r#"{"event":"sendMessage","data":{"receiverId":"B"}}"#)
            .unwrap();
        assert_matches!(msg, InboundMessage::SendMessage { data: Value::Null, .. });
    }

    #[test]
    fn send_message_without_receiver_is_rejected() {
        let err = InboundMessage::parse(r#"{"event":"sendMessage","data":{"data":"hi"}}"#)
            .unwrap_err();
        assert_matches!(
            err,
            ProtocolError::MissingField { event: "sendMessage", field: "receiverId" }
        );
    }

    #[test]
    fn send_message_with_non_object_payload_is_rejected() {
        let err = InboundMessage::parse(r#"{"event":"sendMessage","data":"B"}"#).unwrap_err();
        assert_matches!(err, ProtocolError::MissingField { .. });
    }

    #[test]
    fn unknown_event_is_rejected() {
        let err = InboundMessage::parse(r#"{"event":"typing","data":{}}"#).unwrap_err();
        assert_matches!(err, ProtocolError::UnknownEvent(ref e) if e == "typing");
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert_matches!(
            InboundMessage::parse("not json"),
            Err(ProtocolError::InvalidJson(_))
        );
        assert_matches!(
            InboundMessage::parse("[1,2]"),
            Err(ProtocolError::InvalidJson(_))
        );
        assert_matches!(
            InboundMessage::parse(r#"{"data":"A"}"#),
            Err(ProtocolError::InvalidJson(_))
        );
    }

    #[test]
    fn outbound_frame_shape() {
        let data = json!("hi");
        let text = OutboundFrame::new(EVENT_RECEIVE_MESSAGE, &data).to_json().unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, json!({"event":"getMessage","data":"hi"}));
    }

    #[test]
    fn connected_payload_carries_connection_id() {
        let id = ConnectionId::from("conn_1");
        let payload = connected_payload(&id);
        assert_eq!(payload["connectionId"], "conn_1");
        assert!(payload["timestamp"].is_string());
    }
}
