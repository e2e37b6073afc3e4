//! Registry of live chat connections and their per-chat subscriptions.
//!
//! Each connection owns an unbounded outbound queue drained by its socket
//! writer task, so publishing never waits on a slow socket. A queue whose
//! receiver is gone marks a dead connection; it is pruned on the next
//! delivery attempt and the remaining recipients are still served.

use dashmap::DashMap;
use metrics::gauge;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use super::protocol::ServerEvent;
use crate::api::metrics::CHAT_CONNECTIONS;

pub type ConnectionId = u64;

/// Session identity a connection was opened with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub user_id: String,
    pub username: String,
    /// Admin connections see every chat
    pub is_admin: bool,
}

impl Participant {
    /// Admins act on any chat; users only on chats opened for them
    pub fn may_access(&self, chat_owner: &str) -> bool {
        self.is_admin || self.user_id == chat_owner
    }
}

struct Connection {
    tx: mpsc::UnboundedSender<String>,
    participant: Participant,
}

#[derive(Default)]
pub struct ChatHub {
    next_id: AtomicU64,
    connections: DashMap<ConnectionId, Connection>,
    subscriptions: DashMap<String, HashSet<ConnectionId>>,
}

impl ChatHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and hand back the receiving end of its queue
    pub fn connect(&self, participant: Participant) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        tracing::debug!(
            connection = id,
            user_id = %participant.user_id,
            is_admin = participant.is_admin,
            "Chat connection registered"
        );
        self.connections.insert(id, Connection { tx, participant });

        gauge!(CHAT_CONNECTIONS).set(self.connections.len() as f64);

        (id, rx)
    }

    pub fn participant(&self, id: ConnectionId) -> Option<Participant> {
        self.connections.get(&id).map(|conn| conn.participant.clone())
    }

    /// Forget a connection and all of its subscriptions
    pub fn disconnect(&self, id: ConnectionId) {
        if self.connections.remove(&id).is_none() {
            return;
        }
        self.subscriptions.retain(|_, subscribers| {
            subscribers.remove(&id);
            !subscribers.is_empty()
        });

        gauge!(CHAT_CONNECTIONS).set(self.connections.len() as f64);
        tracing::debug!(connection = id, "Chat connection removed");
    }

    pub fn subscribe(&self, id: ConnectionId, chat_id: &str) {
        if !self.connections.contains_key(&id) {
            return;
        }
        self.subscriptions
            .entry(chat_id.to_string())
            .or_default()
            .insert(id);

        // Lost a race with disconnect
        if !self.connections.contains_key(&id) {
            self.unsubscribe(id, chat_id);
        }
    }

    fn unsubscribe(&self, id: ConnectionId, chat_id: &str) {
        self.subscriptions.remove_if_mut(chat_id, |_, subscribers| {
            subscribers.remove(&id);
            subscribers.is_empty()
        });
    }

    pub fn is_subscribed(&self, id: ConnectionId, chat_id: &str) -> bool {
        self.subscriptions
            .get(chat_id)
            .map(|subscribers| subscribers.contains(&id))
            .unwrap_or(false)
    }

    /// Reply to a single connection. Returns false if it is gone.
    pub fn send_to(&self, id: ConnectionId, event: &ServerEvent) -> bool {
        let delivered = match self.connections.get(&id) {
            Some(conn) => conn.tx.send(event.to_json()).is_ok(),
            None => return false,
        };
        if !delivered {
            self.disconnect(id);
        }
        delivered
    }

    /// Deliver an event to the subscribers of `chat_id` and to every admin
    /// connection. Returns the number of connections reached.
    pub fn publish(&self, chat_id: &str, event: &ServerEvent) -> usize {
        let mut recipients: HashSet<ConnectionId> = self
            .subscriptions
            .get(chat_id)
            .map(|subscribers| subscribers.clone())
            .unwrap_or_default();
        recipients.extend(
            self.connections
                .iter()
                .filter(|entry| entry.value().participant.is_admin)
                .map(|entry| *entry.key()),
        );

        let payload = event.to_json();
        let mut delivered = 0;
        let mut dead = Vec::new();

        for id in recipients {
            let ok = match self.connections.get(&id) {
                Some(conn) => conn.tx.send(payload.clone()).is_ok(),
                None => false,
            };
            if ok {
                delivered += 1;
            } else {
                dead.push(id);
            }
        }

        for id in dead {
            tracing::debug!(connection = id, chat_id = %chat_id, "Pruning dead chat connection");
            self.unsubscribe(id, chat_id);
            self.disconnect(id);
        }

        delivered
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn subscriber_count(&self, chat_id: &str) -> usize {
        self.subscriptions
            .get(chat_id)
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }
}
