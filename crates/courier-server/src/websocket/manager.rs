//! Table of live connections, keyed by [`ConnectionId`].

use std::sync::Arc;

use courier_core::ConnectionId;
use dashmap::DashMap;
use metrics::counter;
use serde_json::Value;
use tracing::warn;

use super::connection::ClientConnection;
use crate::relay::Outbound;

/// Owns every live [`ClientConnection`]. The dispatcher reaches them only
/// through the [`Outbound`] impl.
#[derive(Default)]
pub struct ConnectionManager {
    connections: DashMap<ConnectionId, Arc<ClientConnection>>,
}

impl ConnectionManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a connection, replacing any previous one with the same id.
    pub fn add(&self, connection: Arc<ClientConnection>) {
        let _ = self.connections.insert(connection.id.clone(), connection);
    }

    /// Stop tracking a connection.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.remove(id).map(|(_, conn)| conn)
    }

    /// Look up a connection.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of tracked connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl Outbound for ConnectionManager {
    fn send_to(&self, connection: &ConnectionId, event: &str, payload: &Value) -> bool {
        let Some(conn) = self.get(connection) else {
            return false;
        };
        if conn.send_event(event, payload) {
            return true;
        }
        if conn.is_open() {
            warn!(
                connection_id = %connection,
                dropped = conn.drop_count(),
                "send queue refused frame, dropping"
            );
            counter!(crate::metrics::WS_SEND_DROPS_TOTAL).increment(1);
        }
        false
    }

    fn is_open(&self, connection: &ConnectionId) -> bool {
        self.connections
            .get(connection)
            .is_some_and(|entry| entry.value().is_open())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn open_connection(id: &str, capacity: usize) -> (Arc<ClientConnection>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = Arc::new(ClientConnection::new(id.into(), tx));
        let _ = conn.open();
        (conn, rx)
    }

    #[test]
    fn add_get_remove() {
        let manager = ConnectionManager::new();
        let (conn, _rx) = open_connection("c1", 4);
        manager.add(conn);
        assert_eq!(manager.connection_count(), 1);
        assert!(manager.get(&"c1".into()).is_some());
        assert!(manager.remove(&"c1".into()).is_some());
        assert!(manager.remove(&"c1".into()).is_none());
        assert_eq!(manager.connection_count(), 0);
    }

    #[tokio::test]
    async fn send_to_open_connection() {
        let manager = ConnectionManager::new();
        let (conn, mut rx) = open_connection("c1", 4);
        manager.add(conn);
        assert!(manager.send_to(&"c1".into(), "getMessage", &serde_json::json!("hi")));
        let text = rx.recv().await.unwrap();
        assert_eq!(text, r#"{"event":"getMessage","data":"hi"}"#);
    }

    #[test]
    fn send_to_unknown_connection_fails() {
        let manager = ConnectionManager::new();
        assert!(!manager.send_to(&"ghost".into(), "getMessage", &Value::Null));
        assert!(!manager.is_open(&"ghost".into()));
    }

    #[test]
    fn closed_connection_is_not_open() {
        let manager = ConnectionManager::new();
        let (conn, _rx) = open_connection("c1", 4);
        manager.add(conn.clone());
        assert!(manager.is_open(&"c1".into()));
        let _ = conn.close();
        assert!(!manager.is_open(&"c1".into()));
        assert!(!manager.send_to(&"c1".into(), "getMessage", &Value::Null));
    }

    #[test]
    fn full_queue_fails_without_blocking() {
        let manager = ConnectionManager::new();
        let (conn, _rx) = open_connection("c1", 1);
        manager.add(conn.clone());
        assert!(manager.send_to(&"c1".into(), "getMessage", &Value::Null));
        assert!(!manager.send_to(&"c1".into(), "getMessage", &Value::Null));
        assert_eq!(conn.drop_count(), 1);
    }
}
