//! State of one WebSocket connection.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use courier_core::ConnectionId;
use courier_core::protocol::OutboundFrame;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

/// Lifecycle of a connection. `Closed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upgrade accepted, session not yet running.
    Connecting,
    /// Frames flow both ways.
    Open,
    /// Gone. Nothing is sent or accepted any more.
    Closed,
}

/// A connected WebSocket client as seen by the rest of the server.
pub struct ClientConnection {
    /// Transport-assigned identity.
    pub id: ConnectionId,
    state: Mutex<ConnectionState>,
    /// Queue drained by the session's writer task.
    tx: mpsc::Sender<String>,
    /// When the upgrade completed.
    pub connected_at: Instant,
    /// Whether the client has shown activity since the last heartbeat check.
    pub is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    /// Frames refused because the queue was full or closed.
    pub dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a connection in the `Connecting` state.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<String>) -> Self {
        let now = Instant::now();
        Self {
            id,
            state: Mutex::new(ConnectionState::Connecting),
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// `Connecting → Open`. Returns `false` if the connection already left `Connecting`.
    pub fn open(&self) -> bool {
        let mut state = self.state.lock();
        if *state == ConnectionState::Connecting {
            *state = ConnectionState::Open;
            true
        } else {
            false
        }
    }

    /// Move to `Closed`. Returns `false` if it already was.
    pub fn close(&self) -> bool {
        let mut state = self.state.lock();
        let was_closed = *state == ConnectionState::Closed;
        *state = ConnectionState::Closed;
        !was_closed
    }

    /// Whether frames may be sent.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Queue raw text for the writer task.
    ///
    /// Returns `false` without blocking when the connection is not open or
    /// the queue is full or closed; the drop counter is bumped in the latter case.
    pub fn send(&self, text: String) -> bool {
        if !self.is_open() {
            return false;
        }
        if self.tx.try_send(text).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize `{"event", "data"}` and queue it.
    pub fn send_event(&self, event: &str, payload: &Value) -> bool {
        match OutboundFrame::new(event, payload).to_json() {
            Ok(text) => self.send(text),
            Err(_) => false,
        }
    }

    /// Frames refused so far.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record client activity (pong or any inbound frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Time since the last recorded activity.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Read and clear the alive flag.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the upgrade.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
