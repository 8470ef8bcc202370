//! In-memory presence: which connection each online user is reachable on.

use std::collections::HashMap;

use courier_core::{ConnectionId, UserId};
use parking_lot::Mutex;

#[derive(Default)]
struct Entries {
    by_user: HashMap<UserId, ConnectionId>,
    by_connection: HashMap<ConnectionId, UserId>,
}

/// User → connection mapping.
///
/// Holds at most one entry per user and at most one per connection. Every
/// operation takes the lock once, so each call is atomic with respect to the
/// others. Nothing is persisted; a fresh registry starts empty.
#[derive(Default)]
pub struct PresenceRegistry {
    entries: Mutex<Entries>,
}

impl PresenceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `user` to `connection`, replacing whatever either side was bound to.
    ///
    /// A user's previous connection stays open but is no longer reachable
    /// through [`lookup`](Self::lookup). Returns the connection that was
    /// displaced, if any.
    pub fn register(&self, user: UserId, connection: ConnectionId) -> Option<ConnectionId> {
        let mut entries = self.entries.lock();

        // A connection represents one user: drop its previous binding.
        if let Some(prev_user) = entries.by_connection.remove(&connection) {
            if entries.by_user.get(&prev_user) == Some(&connection) {
                let _ = entries.by_user.remove(&prev_user);
            }
        }

        let displaced = entries.by_user.insert(user.clone(), connection.clone());
        if let Some(ref old) = displaced {
            if old != &connection {
                let _ = entries.by_connection.remove(old);
            }
        }
        let _ = entries.by_connection.insert(connection.clone(), user);

        displaced.filter(|old| old != &connection)
    }

    /// Remove the entry owned by `connection`. Unknown connections are a no-op.
    ///
    /// Returns the user that went offline, if any.
    pub fn unregister(&self, connection: &ConnectionId) -> Option<UserId> {
        let mut entries = self.entries.lock();
        let user = entries.by_connection.remove(connection)?;
        if entries.by_user.get(&user) == Some(connection) {
            let _ = entries.by_user.remove(&user);
        }
        Some(user)
    }

    /// Connection the user is currently reachable on.
    pub fn lookup(&self, user: &UserId) -> Option<ConnectionId> {
        self.entries.lock().by_user.get(user).cloned()
    }

    /// User bound to a connection, if it has registered.
    pub fn user_for(&self, connection: &ConnectionId) -> Option<UserId> {
        self.entries.lock().by_connection.get(connection).cloned()
    }

    /// Number of users currently online.
    pub fn len(&self) -> usize {
        self.entries.lock().by_user.len()
    }

    /// Whether no user is online.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
