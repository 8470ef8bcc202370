//! The single consumer of [`RelayEvent`]s.

use std::sync::Arc;

use courier_core::protocol::EVENT_RECEIVE_MESSAGE;
use courier_core::{ConnectionId, UserId};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::event::{MessageEnvelope, RelayEvent};
use super::outbound::Outbound;
use crate::presence::PresenceRegistry;

/// Why a send-intent produced no delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// No presence entry for the receiver.
    RecipientOffline,
    /// The receiver's connection refused the frame (closed or queue full).
    SendFailed,
}

impl DropReason {
    /// Label value for metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RecipientOffline => "recipient_offline",
            Self::SendFailed => "send_failed",
        }
    }
}

/// What [`Dispatcher::dispatch`] did with one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The user is now bound to the source connection.
    Registered {
        /// Connection the user was previously reachable on.
        displaced: Option<ConnectionId>,
    },
    /// The payload was queued on the receiver's connection.
    Delivered {
        /// Connection the payload went to.
        connection: ConnectionId,
    },
    /// The payload was not delivered. Never reported to the sender.
    Dropped(DropReason),
    /// The connection's presence entry, if any, is gone.
    Unregistered {
        /// User that went offline.
        user: Option<UserId>,
    },
    /// The source connection had already closed; nothing was done.
    Discarded,
}

/// Applies relay events to the presence registry and the transport.
pub struct Dispatcher {
    registry: Arc<PresenceRegistry>,
    outbound: Arc<dyn Outbound>,
}

impl Dispatcher {
    /// Create a dispatcher over a registry and a transport.
    pub fn new(registry: Arc<PresenceRegistry>, outbound: Arc<dyn Outbound>) -> Self {
        Self { registry, outbound }
    }

    /// The registry this dispatcher mutates.
    pub fn registry(&self) -> &Arc<PresenceRegistry> {
        &self.registry
    }

    /// Handle one event. Never fails: every problem becomes an outcome.
    pub fn dispatch(&self, event: RelayEvent) -> DispatchOutcome {
        counter!(crate::metrics::RELAY_EVENTS_TOTAL, "kind" => event.kind()).increment(1);

        let outcome = match event {
            RelayEvent::Register { connection, user } => {
                if !self.outbound.is_open(&connection) {
                    warn!(connection_id = %connection, user_id = %user, "register from closed connection, discarding");
                    return DispatchOutcome::Discarded;
                }
                info!(connection_id = %connection, user_id = %user, "user online");
                let displaced = self.registry.register(user, connection);
                if let Some(ref old) = displaced {
                    debug!(displaced = %old, "previous connection no longer reachable");
                }
                DispatchOutcome::Registered { displaced }
            }
            RelayEvent::SendIntent {
                connection,
                envelope,
            } => {
                if !self.outbound.is_open(&connection) {
                    warn!(connection_id = %connection, "send from closed connection, discarding");
                    return DispatchOutcome::Discarded;
                }
                self.relay(&connection, envelope)
            }
            RelayEvent::Disconnect { connection } => {
                let user = self.registry.unregister(&connection);
                if let Some(ref user) = user {
                    info!(connection_id = %connection, user_id = %user, "user offline");
                }
                DispatchOutcome::Unregistered { user }
            }
        };

        #[allow(clippy::cast_precision_loss)]
        let online = self.registry.len() as f64;
        gauge!(crate::metrics::PRESENCE_ONLINE_USERS).set(online);
        outcome
    }

    fn relay(&self, from: &ConnectionId, envelope: MessageEnvelope) -> DispatchOutcome {
        let MessageEnvelope { receiver, payload } = envelope;

        let Some(target) = self.registry.lookup(&receiver) else {
            debug!(from = %from, receiver = %receiver, "receiver offline, dropping");
            return dropped(DropReason::RecipientOffline);
        };

        if self.outbound.send_to(&target, EVENT_RECEIVE_MESSAGE, &payload) {
            debug!(from = %from, receiver = %receiver, to = %target, "message relayed");
            counter!(crate::metrics::RELAY_MESSAGES_DELIVERED_TOTAL).increment(1);
            DispatchOutcome::Delivered { connection: target }
        } else {
            debug!(from = %from, receiver = %receiver, to = %target, "send failed, dropping");
            dropped(DropReason::SendFailed)
        }
    }

    /// Consume events until the channel closes or `cancel` fires.
    ///
    /// On cancellation the channel is closed and events already queued are
    /// still applied before returning.
    pub async fn run(self, mut events: mpsc::Receiver<RelayEvent>, cancel: CancellationToken) {
        info!("relay dispatcher started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    events.close();
                    let mut drained = 0usize;
                    while let Some(event) = events.recv().await {
                        let _ = self.dispatch(event);
                        drained += 1;
                    }
                    info!(drained, "relay dispatcher stopped");
                    return;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        info!("event channel closed, relay dispatcher stopped");
                        return;
                    };
                    let _ = self.dispatch(event);
                }
            }
        }
    }
}

fn dropped(reason: DropReason) -> DispatchOutcome {
    counter!(crate::metrics::RELAY_MESSAGES_DROPPED_TOTAL, "reason" => reason.as_str())
        .increment(1);
    DispatchOutcome::Dropped(reason)
}
