//! Per-connection session state
//!
//! A session exists only for authenticated connections: the broker creates
//! it after the identity check succeeds and tears it down exactly once on
//! disconnect.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::sync::{mpsc, RwLock};

use crate::error::{HubError, Result};
use crate::protocol::events::ServerEvent;
use crate::{current_timestamp, new_id, ConnectionId, ConversationId, UserId};

/// Outbound frame queue for one connection
///
/// Unbounded so broadcasters never block on a slow peer; the per-connection
/// writer task drains it onto the wire.
pub type OutboundSender = mpsc::UnboundedSender<Bytes>;

/// State for one live, authenticated connection
pub struct Session {
    /// Connection handle identifier
    pub conn_id: ConnectionId,
    /// Authenticated user ID
    pub user_id: UserId,
    /// Authenticated username (cached at handshake time)
    pub username: String,
    /// Outbound frame queue
    outbound: OutboundSender,
    /// Rooms this session has joined (introspection; the registry is the
    /// source of truth for cleanup)
    joined_rooms: RwLock<HashSet<ConversationId>>,
    /// Last typing_start per room (no server-side expiry; clients expire
    /// stale indicators themselves)
    last_typing: RwLock<HashMap<ConversationId, u64>>,
    /// Cleanup guard: flipped exactly once on close
    closed: AtomicBool,
    /// Connection timestamp (Unix ms)
    pub connected_at: u64,
}

impl Session {
    /// Create a session for an authenticated connection
    pub fn new(user_id: UserId, username: String, outbound: OutboundSender) -> Self {
        Self {
            conn_id: new_id(),
            user_id,
            username,
            outbound,
            joined_rooms: RwLock::new(HashSet::new()),
            last_typing: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            connected_at: current_timestamp(),
        }
    }

    /// Get a clone of the outbound sender (handed to the room registry)
    pub fn sender(&self) -> OutboundSender {
        self.outbound.clone()
    }

    /// Queue an encoded frame for this connection
    pub fn send_frame(&self, frame: Bytes) -> Result<()> {
        self.outbound
            .send(frame)
            .map_err(|_| HubError::transport("connection closed"))
    }

    /// Encode and queue a server event for this connection
    pub fn send(&self, event: &ServerEvent) -> Result<()> {
        self.send_frame(event.encode()?)
    }

    /// Record a room join
    pub async fn note_join(&self, room: &ConversationId) {
        self.joined_rooms.write().await.insert(room.clone());
    }

    /// Record a room leave
    pub async fn note_leave(&self, room: &ConversationId) {
        self.joined_rooms.write().await.remove(room);
        self.last_typing.write().await.remove(room);
    }

    /// Rooms this session has joined
    pub async fn joined_rooms(&self) -> Vec<ConversationId> {
        self.joined_rooms.read().await.iter().cloned().collect()
    }

    /// Check whether this session joined a room
    pub async fn is_joined(&self, room: &ConversationId) -> bool {
        self.joined_rooms.read().await.contains(room)
    }

    /// Record a typing_start for a room
    pub async fn mark_typing(&self, room: &ConversationId, now: u64) {
        self.last_typing.write().await.insert(room.clone(), now);
    }

    /// Clear the typing marker for a room
    pub async fn clear_typing(&self, room: &ConversationId) {
        self.last_typing.write().await.remove(room);
    }

    /// Last typing_start timestamp for a room, if any
    pub async fn last_typing_at(&self, room: &ConversationId) -> Option<u64> {
        self.last_typing.read().await.get(room).copied()
    }

    /// Claim the close transition
    ///
    /// Returns true for exactly one caller; duplicate disconnect signals
    /// see false and skip cleanup.
    pub fn begin_close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    /// Whether this session has entered the closed state
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
