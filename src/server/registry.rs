//! Room registry
//!
//! Maps conversations to the outbound queues of subscribed connections and
//! fans encoded frames out to them. The registry is an ephemeral routing
//! cache over connections; membership authorization always goes through the
//! store, never through subscription state.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::server::session::OutboundSender;
use crate::{ConnectionId, ConversationId};

/// Subscription and sequencing state for all rooms
#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<ConversationId, HashMap<ConnectionId, OutboundSender>>>,
    /// Per-room sequencing locks, held across commit-then-broadcast so all
    /// subscribers observe one room's events in the same order. Retained for
    /// the process lifetime; a lock entry is a few pointers.
    locks: RwLock<HashMap<ConversationId, Arc<Mutex<()>>>>,
}

impl RoomRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a connection to a room (idempotent)
    pub async fn join(&self, room: &ConversationId, conn_id: &ConnectionId, sender: OutboundSender) {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room.clone())
            .or_default()
            .insert(conn_id.clone(), sender);
    }

    /// Unsubscribe a connection from a room
    pub async fn leave(&self, room: &ConversationId, conn_id: &ConnectionId) {
        let mut rooms = self.rooms.write().await;
        if let Some(subscribers) = rooms.get_mut(room) {
            subscribers.remove(conn_id);
            if subscribers.is_empty() {
                rooms.remove(room);
            }
        }
    }

    /// Unsubscribe a connection from every room it is in
    ///
    /// This is the disconnect path's source of truth: it scans all rooms
    /// rather than trusting per-session bookkeeping. Returns the rooms left.
    pub async fn leave_all(&self, conn_id: &ConnectionId) -> Vec<ConversationId> {
        let mut rooms = self.rooms.write().await;
        let mut left = Vec::new();

        rooms.retain(|room, subscribers| {
            if subscribers.remove(conn_id).is_some() {
                left.push(room.clone());
            }
            !subscribers.is_empty()
        });

        left
    }

    /// Send an encoded frame to every subscriber of a room
    ///
    /// The same `Bytes` is cheaply cloned per recipient. Subscribers whose
    /// outbound queue is gone are pruned afterwards; a dead peer never
    /// affects delivery to the others. Returns the number of deliveries.
    pub async fn broadcast(
        &self,
        room: &ConversationId,
        frame: &Bytes,
        exclude: Option<&ConnectionId>,
    ) -> usize {
        let mut stale = Vec::new();
        let mut delivered = 0;

        {
            let rooms = self.rooms.read().await;
            let Some(subscribers) = rooms.get(room) else {
                return 0;
            };

            for (conn_id, sender) in subscribers {
                if exclude == Some(conn_id) {
                    continue;
                }
                if sender.send(frame.clone()).is_ok() {
                    delivered += 1;
                } else {
                    stale.push(conn_id.clone());
                }
            }
        }

        if !stale.is_empty() {
            debug!(room = %room, count = stale.len(), "pruning stale subscribers");
            let mut rooms = self.rooms.write().await;
            if let Some(subscribers) = rooms.get_mut(room) {
                for conn_id in &stale {
                    subscribers.remove(conn_id);
                }
                if subscribers.is_empty() {
                    rooms.remove(room);
                }
            }
        }

        delivered
    }

    /// Sequencing lock for a room, created lazily on first use
    pub async fn room_lock(&self, room: &ConversationId) -> Arc<Mutex<()>> {
        {
            let locks = self.locks.read().await;
            if let Some(lock) = locks.get(room) {
                return Arc::clone(lock);
            }
        }

        let mut locks = self.locks.write().await;
        Arc::clone(locks.entry(room.clone()).or_default())
    }

    /// Whether a connection is subscribed to a room
    pub async fn is_subscribed(&self, room: &ConversationId, conn_id: &ConnectionId) -> bool {
        self.rooms
            .read()
            .await
            .get(room)
            .map(|s| s.contains_key(conn_id))
            .unwrap_or(false)
    }

    /// Number of subscribers in a room
    pub async fn subscriber_count(&self, room: &ConversationId) -> usize {
        self.rooms
            .read()
            .await
            .get(room)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Number of rooms with at least one subscriber
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
