//! One WebSocket session, from upgrade to disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use courier_core::ConnectionId;
use courier_core::protocol::{EVENT_CONNECTED, InboundMessage, connected_payload};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use super::manager::ConnectionManager;
use crate::relay::RelayEvent;
use crate::shutdown::ShutdownCoordinator;

/// How long the writer gets to flush a close frame.
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Everything a session needs from the server, cloned per connection.
#[derive(Clone)]
pub struct SessionContext {
    /// Live connection table.
    pub connections: Arc<ConnectionManager>,
    /// Inbound side of the dispatcher.
    pub events: mpsc::Sender<RelayEvent>,
    /// Server-wide shutdown.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Outbound queue depth.
    pub send_queue_capacity: usize,
    /// Ping interval.
    pub heartbeat_interval: Duration,
    /// Silence tolerated before closing.
    pub heartbeat_timeout: Duration,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    ClientClose,
    TransportClosed,
    HeartbeatTimeout,
    Shutdown,
}

impl CloseReason {
    /// Map a finished heartbeat to the reason the session ends.
    fn from_heartbeat(result: HeartbeatResult) -> Self {
        match result {
            HeartbeatResult::TimedOut => Self::HeartbeatTimeout,
            HeartbeatResult::Cancelled => Self::Shutdown,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::ClientClose => "client_close",
            Self::TransportClosed => "transport_closed",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Drive a connected client until it goes away.
///
/// 1. Opens the connection and queues the `connected` greeting
/// 2. Forwards queued frames and periodic pings to the socket
/// 3. Turns inbound frames into relay events; malformed ones are dropped
/// 4. Closes on client close, socket error, heartbeat timeout, or shutdown
/// 5. Emits a disconnect event so presence is cleared
#[instrument(skip_all, fields(connection_id = %connection_id))]
pub async fn run_ws_session(ws: WebSocket, connection_id: ConnectionId, ctx: SessionContext) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<String>(ctx.send_queue_capacity);
    let connection = Arc::new(ClientConnection::new(connection_id.clone(), send_tx));
    let _ = connection.open();
    ctx.connections.add(connection.clone());

    info!("client connected");
    counter!(crate::metrics::WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(crate::metrics::WS_CONNECTIONS_ACTIVE).increment(1.0);

    if !connection.send_event(EVENT_CONNECTED, &connected_payload(&connection_id)) {
        warn!("failed to queue greeting");
    }

    let session_cancel = ctx.shutdown.child_token();

    let writer_cancel = session_cancel.clone();
    let ping_interval = ctx.heartbeat_interval;
    let mut writer = tokio::spawn(
        async move {
            let mut ping = tokio::time::interval(ping_interval);
            // Skip the immediate first tick
            let _ = ping.tick().await;

            loop {
                tokio::select! {
                    msg = send_rx.recv() => {
                        let Some(text) = msg else { break };
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    _ = ping.tick() => {
                        if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                            break;
                        }
                    }
                    () = writer_cancel.cancelled() => {
                        let frame = CloseFrame {
                            code: close_code::AWAY,
                            reason: "connection closed".into(),
                        };
                        let _ = ws_tx.send(Message::Close(Some(frame))).await;
                        break;
                    }
                }
            }
        }
        .in_current_span(),
    );

    let heartbeat = run_heartbeat(
        connection.clone(),
        ctx.heartbeat_interval,
        ctx.heartbeat_timeout,
        session_cancel.clone(),
    );
    tokio::pin!(heartbeat);

    let reason = loop {
        tokio::select! {
            result = &mut heartbeat => {
                if result == HeartbeatResult::TimedOut {
                    warn!(
                        silent_for = ?connection.last_pong_elapsed(),
                        "client unresponsive, closing"
                    );
                    counter!(crate::metrics::WS_HEARTBEAT_TIMEOUTS_TOTAL).increment(1);
                }
                break CloseReason::from_heartbeat(result);
            }
            frame = ws_rx.next() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(error)) => {
                        debug!(%error, "socket error");
                        break CloseReason::TransportClosed;
                    }
                    None => break CloseReason::TransportClosed,
                };
                connection.mark_alive();
                match frame {
                    Message::Text(text) => handle_text(text.as_str(), &connection_id, &ctx.events).await,
                    Message::Binary(data) => match std::str::from_utf8(&data) {
                        Ok(text) => handle_text(text, &connection_id, &ctx.events).await,
                        Err(_) => {
                            warn!(len = data.len(), "discarding non-UTF-8 binary frame");
                            counter!(crate::metrics::WS_MALFORMED_FRAMES_TOTAL, "kind" => "invalid_utf8")
                                .increment(1);
                        }
                    },
                    Message::Close(_) => break CloseReason::ClientClose,
                    Message::Ping(_) | Message::Pong(_) => {}
                }
            }
        }
    };

    // Closed before anything else so late events from this connection are discarded.
    let _ = connection.close();
    session_cancel.cancel();
    let _ = ctx.connections.remove(&connection_id);

    let disconnect = RelayEvent::Disconnect {
        connection: connection_id.clone(),
    };
    if ctx.events.send(disconnect).await.is_err() {
        debug!("dispatcher stopped, skipping disconnect event");
    }

    if tokio::time::timeout(WRITER_FLUSH_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        writer.abort();
    }

    info!(
        reason = reason.as_str(),
        age = ?connection.age(),
        dropped = connection.drop_count(),
        "client disconnected"
    );
    counter!(crate::metrics::WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(crate::metrics::WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(crate::metrics::WS_CONNECTION_DURATION_SECONDS)
        .record(connection.age().as_secs_f64());
}

/// Decode one frame and hand it to the dispatcher. Malformed frames are logged and dropped.
async fn handle_text(text: &str, connection_id: &ConnectionId, events: &mpsc::Sender<RelayEvent>) {
    let message = match InboundMessage::parse(text) {
        Ok(message) => message,
        Err(error) => {
            warn!(kind = error.kind(), %error, "discarding malformed frame");
            counter!(crate::metrics::WS_MALFORMED_FRAMES_TOTAL, "kind" => error.kind())
                .increment(1);
            return;
        }
    };

    debug!(event = message.event_name(), "inbound event");
    let event = RelayEvent::from_inbound(connection_id.clone(), message);
    if events.send(event).await.is_err() {
        debug!("dispatcher stopped, dropping event");
    }
}

#[cfg(test)]
mod tests {
    // Full sessions need a real socket; see tests/integration.rs.
    use super::*;

    #[test]
    fn close_reasons_have_distinct_labels() {
        let labels = [
            CloseReason::ClientClose,
            CloseReason::TransportClosed,
            CloseReason::HeartbeatTimeout,
            CloseReason::Shutdown,
        ]
        .map(CloseReason::as_str);
        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), labels.len());
    }

    #[test]
    fn heartbeat_result_decides_close_reason() {
        assert_eq!(
            CloseReason::from_heartbeat(HeartbeatResult::TimedOut),
            CloseReason::HeartbeatTimeout
        );
        assert_eq!(
            CloseReason::from_heartbeat(HeartbeatResult::Cancelled),
            CloseReason::Shutdown
        );
    }

    #[tokio::test]
    async fn cancelled_session_is_not_a_timeout() {
        let (tx, _rx) = mpsc::channel(4);
        let connection = Arc::new(ClientConnection::new("c1".into(), tx));
        let cancel = tokio_util::sync::CancellationToken::new();
        cancel.cancel();
        let result = run_heartbeat(
            connection,
            Duration::from_secs(1),
            Duration::from_secs(1),
            cancel,
        )
        .await;
        assert_eq!(CloseReason::from_heartbeat(result), CloseReason::Shutdown);
    }

    #[tokio::test]
    async fn valid_frame_becomes_relay_event() {
        let (tx, mut rx) = mpsc::channel(4);
        handle_text(
            r#"{"event":"newUser","data":{"userId":"A"}}"#,
            &"c1".into(),
            &tx,
        )
        .await;
        assert_eq!(
            rx.recv().await.unwrap(),
            RelayEvent::Register {
                connection: "c1".into(),
                user: "A".into()
            }
        );
    }

    #[tokio::test]
    async fn malformed_frame_is_dropped() {
        let (tx, mut rx) = mpsc::channel(4);
        handle_text("{not json", &"c1".into(), &tx).await;
        handle_text(r#"{"event":"sendMessage","data":{}}"#, &"c1".into(), &tx).await;
        handle_text(r#"{"event":"typing","data":null}"#, &"c1".into(), &tx).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_dispatcher_is_not_fatal() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        handle_text(r#"{"event":"newUser","data":"A"}"#, &"c1".into(), &tx).await;
    }
}
