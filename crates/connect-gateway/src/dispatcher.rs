use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use connect_types::events::GatewayEvent;
use connect_types::models::{ExpiresIn, Presence, PresenceStatus};

use crate::presence::PresenceTracker;

/// Manages all connected clients and broadcasts events. One broadcast
/// channel carries every event and preserves send order; the channel's
/// delivery path holds its lock from store commit through the send here,
/// so every subscriber observes channel messages in append order.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for gateway events — all connected clients receive
    /// all events; per-connection subscription filtering happens in the
    /// connection loop.
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Presence state, shared with the REST surface.
    presence: PresenceTracker,

    /// Active connection per user: user_id -> conn_id. Guards against a
    /// stale disconnect clobbering a newer connection's presence.
    connections: RwLock<HashMap<Uuid, Uuid>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                presence: PresenceTracker::new(),
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a new connection for a user and put them online.
    /// Returns the conn_id the connection must present on close.
    pub async fn user_connected(&self, user_id: Uuid) -> Uuid {
        let conn_id = Uuid::new_v4();
        self.inner.connections.write().await.insert(user_id, conn_id);
        self.inner.presence.connected(user_id);
        self.push_presence(user_id);
        conn_id
    }

    /// Mark a user offline, but only if conn_id still owns the connection —
    /// a newer connection supersedes the old one (last write wins).
    pub async fn user_disconnected(&self, user_id: Uuid, conn_id: Uuid) {
        {
            let mut connections = self.inner.connections.write().await;
            match connections.get(&user_id) {
                Some(current) if *current == conn_id => {
                    connections.remove(&user_id);
                }
                // A newer connection has taken over — don't touch anything
                _ => return,
            }
        }

        self.inner.presence.disconnected(user_id);
        self.push_presence(user_id);
    }

    pub fn set_status(&self, user_id: Uuid, status: PresenceStatus) {
        self.inner.presence.set_status(user_id, status);
        self.push_presence(user_id);
    }

    pub fn set_custom_status(
        &self,
        user_id: Uuid,
        emoji: String,
        text: String,
        expires_in: ExpiresIn,
    ) {
        self.inner
            .presence
            .set_custom_status(user_id, emoji, text, expires_in, Utc::now());
        self.push_presence(user_id);
    }

    pub fn clear_custom_status(&self, user_id: Uuid) {
        self.inner.presence.clear_custom_status(user_id);
        self.push_presence(user_id);
    }

    pub fn presence_of(&self, user_id: Uuid) -> Presence {
        self.inner.presence.get(user_id, Utc::now())
    }

    /// Presence of everyone currently not offline, expiry already applied.
    pub fn presence_snapshot(&self) -> Vec<Presence> {
        self.inner.presence.snapshot(Utc::now())
    }

    fn push_presence(&self, user_id: Uuid) {
        let presence = self.inner.presence.get(user_id, Utc::now());
        self.broadcast(GatewayEvent::PresenceUpdate {
            user_id,
            status: presence.status,
            custom_status: presence.custom_status,
        });
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
