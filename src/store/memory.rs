//! In-memory store implementation
//!
//! Backs the dev server and the test suite. Mutations take the
//! conversations lock before the messages lock, in that order, so
//! cross-map operations cannot deadlock.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{HubError, Result};
use crate::{current_timestamp, new_id, ConversationId, MessageId, UserId};

use super::{
    ConversationKind, ConversationRecord, EditState, MessageRecord, NewMessage, Reaction,
    ReadReceipt, Store, UserInfo,
};

/// In-memory domain store
#[derive(Default)]
pub struct MemoryStore {
    conversations: RwLock<HashMap<ConversationId, ConversationRecord>>,
    messages: RwLock<HashMap<MessageId, MessageRecord>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a conversation (seeding helper, not part of the hub contract)
    pub async fn create_conversation(
        &self,
        participants: Vec<UserId>,
        kind: ConversationKind,
        name: Option<String>,
        created_by: UserId,
    ) -> ConversationRecord {
        let now = current_timestamp();
        let record = ConversationRecord {
            id: new_id(),
            participants,
            kind,
            name,
            created_by,
            created_at: now,
            last_activity: now,
            is_active: true,
        };

        let mut conversations = self.conversations.write().await;
        conversations.insert(record.id.clone(), record.clone());
        record
    }

    /// Insert a pre-built conversation (seeding helper)
    pub async fn insert_conversation(&self, record: ConversationRecord) {
        let mut conversations = self.conversations.write().await;
        conversations.insert(record.id.clone(), record);
    }

    /// Insert a pre-built message (seeding helper)
    pub async fn insert_message(&self, record: MessageRecord) {
        let mut messages = self.messages.write().await;
        messages.insert(record.id.clone(), record);
    }

    /// Number of stored conversations
    pub async fn conversation_count(&self) -> usize {
        self.conversations.read().await.len()
    }

    /// Number of stored messages, including soft-deleted ones
    pub async fn message_count(&self) -> usize {
        self.messages.read().await.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn conversation(&self, id: &ConversationId) -> Result<Option<ConversationRecord>> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(id).cloned())
    }

    async fn is_participant(&self, id: &ConversationId, user_id: &UserId) -> Result<bool> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .get(id)
            .map(|c| c.has_participant(user_id))
            .unwrap_or(false))
    }

    async fn append_message(&self, new: NewMessage) -> Result<MessageRecord> {
        let now = current_timestamp();

        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .get_mut(&new.conversation_id)
            .ok_or_else(|| HubError::not_found("Conversation"))?;
        conversation.last_activity = now;

        let record = MessageRecord {
            id: new_id(),
            conversation_id: new.conversation_id,
            sender: new.sender,
            content: new.content,
            kind: new.kind,
            reply_to: new.reply_to,
            created_at: now,
            edited: EditState::default(),
            reactions: Vec::new(),
            read_by: Vec::new(),
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
        };

        let mut messages = self.messages.write().await;
        messages.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn message(&self, id: &MessageId) -> Result<Option<MessageRecord>> {
        let messages = self.messages.read().await;
        Ok(messages.get(id).cloned())
    }

    async fn edit_message(
        &self,
        id: &MessageId,
        content: &str,
        now: u64,
    ) -> Result<MessageRecord> {
        let mut messages = self.messages.write().await;
        let message = messages
            .get_mut(id)
            .ok_or_else(|| HubError::not_found("Message"))?;

        // Delete dominates: a stale edit must never resurrect the message.
        if message.is_deleted {
            return Err(HubError::stale_state("message has been deleted"));
        }

        if !message.edited.is_edited {
            message.edited.original_content = Some(message.content.clone());
        }
        message.content = content.to_string();
        message.edited.is_edited = true;
        message.edited.edited_at = Some(now);

        Ok(message.clone())
    }

    async fn soft_delete_message(
        &self,
        id: &MessageId,
        deleted_by: &UserId,
        now: u64,
    ) -> Result<MessageRecord> {
        let mut messages = self.messages.write().await;
        let message = messages
            .get_mut(id)
            .ok_or_else(|| HubError::not_found("Message"))?;

        if !message.is_deleted {
            message.is_deleted = true;
            message.deleted_at = Some(now);
            message.deleted_by = Some(deleted_by.clone());
        }

        Ok(message.clone())
    }

    async fn upsert_reaction(
        &self,
        id: &MessageId,
        user: &UserInfo,
        emoji: &str,
        now: u64,
    ) -> Result<MessageRecord> {
        let mut messages = self.messages.write().await;
        let message = messages
            .get_mut(id)
            .ok_or_else(|| HubError::not_found("Message"))?;

        if message.is_deleted {
            return Err(HubError::stale_state("message has been deleted"));
        }

        // One reaction per user: clear any prior one first.
        message.reactions.retain(|r| r.user_id != user.user_id);
        message.reactions.push(Reaction {
            user_id: user.user_id.clone(),
            username: user.username.clone(),
            emoji: emoji.to_string(),
            created_at: now,
        });

        Ok(message.clone())
    }

    async fn mark_read(&self, id: &MessageId, user_id: &UserId, now: u64) -> Result<()> {
        let mut messages = self.messages.write().await;
        let message = messages
            .get_mut(id)
            .ok_or_else(|| HubError::not_found("Message"))?;

        if !message.read_by.iter().any(|r| &r.user_id == user_id) {
            message.read_by.push(ReadReceipt {
                user_id: user_id.clone(),
                read_at: now,
            });
        }

        Ok(())
    }

    async fn unread_count(&self, id: &ConversationId, user_id: &UserId) -> Result<u64> {
        let messages = self.messages.read().await;
        let count = messages
            .values()
            .filter(|m| {
                &m.conversation_id == id
                    && !m.is_deleted
                    && &m.sender.user_id != user_id
                    && !m.read_by.iter().any(|r| &r.user_id == user_id)
            })
            .count();
        Ok(count as u64)
    }
}
