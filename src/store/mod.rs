//! Domain store contract and record types
//!
//! The hub core treats persistence as an external collaborator: every
//! mutation is a single atomic store call, and broadcasts are only issued
//! after the mutation is confirmed committed. [`MemoryStore`] is the
//! reference implementation used by the dev server and tests.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::{ConversationId, MessageId, UserId};

/// Message payload classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
    Audio,
    Video,
}

/// Conversation classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    #[default]
    Direct,
    Group,
}

/// Minimal user identity embedded in records and broadcasts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub user_id: UserId,
    pub username: String,
}

/// One reaction on a message
///
/// Core invariant: at most one reaction per (message, user). A user's new
/// reaction replaces their prior one; it never accumulates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub user_id: UserId,
    pub username: String,
    pub emoji: String,
    pub created_at: u64,
}

/// Read receipt for a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub user_id: UserId,
    pub read_at: u64,
}

/// Edit history for a message
///
/// The original content is preserved on the first edit only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditState {
    pub is_edited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_content: Option<String>,
}

/// A stored chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: UserInfo,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
    pub created_at: u64,
    pub edited: EditState,
    pub reactions: Vec<Reaction>,
    pub read_by: Vec<ReadReceipt>,
    pub is_deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<UserId>,
}

/// A stored conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub id: ConversationId,
    pub participants: Vec<UserId>,
    pub kind: ConversationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub created_by: UserId,
    pub created_at: u64,
    pub last_activity: u64,
    pub is_active: bool,
}

impl ConversationRecord {
    /// Check whether a user participates in this conversation
    pub fn has_participant(&self, user_id: &UserId) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }
}

/// Input for appending a new message
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub sender: UserInfo,
    pub content: String,
    pub kind: MessageKind,
    pub reply_to: Option<MessageId>,
}

/// Persistence contract consumed by the hub core
///
/// Each call is atomic on its own; the core never needs multi-record
/// transactions.
#[async_trait]
pub trait Store: Send + Sync {
    /// Look up a conversation by ID
    async fn conversation(&self, id: &ConversationId) -> Result<Option<ConversationRecord>>;

    /// Check whether a user is a participant of a conversation
    ///
    /// This is the authoritative membership check used for authorization;
    /// the room registry's subscriber sets are only an ephemeral cache.
    async fn is_participant(&self, id: &ConversationId, user_id: &UserId) -> Result<bool>;

    /// Append a message and bump the conversation's last-activity timestamp
    async fn append_message(&self, new: NewMessage) -> Result<MessageRecord>;

    /// Look up a message by ID (including soft-deleted ones)
    async fn message(&self, id: &MessageId) -> Result<Option<MessageRecord>>;

    /// Replace a message's content, preserving the original on first edit
    ///
    /// Fails with `StaleState` if the message is already deleted: the
    /// deleted check happens here, at mutation time, so a delete that
    /// committed first dominates a racing stale edit.
    async fn edit_message(&self, id: &MessageId, content: &str, now: u64)
        -> Result<MessageRecord>;

    /// Soft-delete a message: mark deleted, retain the record for audit
    async fn soft_delete_message(
        &self,
        id: &MessageId,
        deleted_by: &UserId,
        now: u64,
    ) -> Result<MessageRecord>;

    /// Set a user's reaction on a message, replacing any prior one
    async fn upsert_reaction(
        &self,
        id: &MessageId,
        user: &UserInfo,
        emoji: &str,
        now: u64,
    ) -> Result<MessageRecord>;

    /// Record that a user has read a message (idempotent)
    async fn mark_read(&self, id: &MessageId, user_id: &UserId, now: u64) -> Result<()>;

    /// Count messages in a conversation not yet read by a user
    ///
    /// Excludes soft-deleted messages and the user's own messages.
    async fn unread_count(&self, id: &ConversationId, user_id: &UserId) -> Result<u64>;
}
