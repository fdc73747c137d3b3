//! Wire event definitions
//!
//! Events are adjacently tagged JSON objects: `{"type": ..., "payload": ...}`.
//! The `type` names are the protocol contract and must stay stable; payload
//! fields are camelCase on the wire.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{HubError, Result};
use crate::protocol::frame::encode_frame;
use crate::store::{MessageKind, MessageRecord, Reaction};
use crate::{ConversationId, MessageId, UserId};

/// Authentication handshake payload (first frame on a new connection)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatePayload {
    pub token: String,
}

/// Payload naming a conversation (join/leave/typing)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRef {
    pub conversation_id: ConversationId,
}

/// Payload naming a message (delete, deletion broadcast)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub message_id: MessageId,
}

/// Outgoing chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub conversation_id: ConversationId,
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
}

/// Reaction request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddReactionPayload {
    pub message_id: MessageId,
    pub emoji: String,
}

/// Edit request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditMessagePayload {
    pub message_id: MessageId,
    pub content: String,
}

/// Events sent by clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientEvent {
    Authenticate(AuthenticatePayload),
    JoinConversation(ConversationRef),
    LeaveConversation(ConversationRef),
    SendMessage(SendMessagePayload),
    TypingStart(ConversationRef),
    TypingStop(ConversationRef),
    AddReaction(AddReactionPayload),
    EditMessage(EditMessagePayload),
    DeleteMessage(MessageRef),
}

impl ClientEvent {
    /// Decode a client event from a frame body
    pub fn decode(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body)
            .map_err(|e| HubError::validation(format!("malformed event: {}", e)))
    }

    /// Extract the declared `type` of a frame body without decoding the
    /// payload
    ///
    /// Succeeds even when the payload itself is malformed, so a decode
    /// failure can still be answered with the right per-event error.
    pub fn peek_name(body: &[u8]) -> Option<String> {
        #[derive(Deserialize)]
        struct Tag {
            #[serde(rename = "type")]
            name: String,
        }

        serde_json::from_slice::<Tag>(body).ok().map(|t| t.name)
    }

    /// Wire name of this event
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Authenticate(_) => "authenticate",
            ClientEvent::JoinConversation(_) => "join_conversation",
            ClientEvent::LeaveConversation(_) => "leave_conversation",
            ClientEvent::SendMessage(_) => "send_message",
            ClientEvent::TypingStart(_) => "typing_start",
            ClientEvent::TypingStop(_) => "typing_stop",
            ClientEvent::AddReaction(_) => "add_reaction",
            ClientEvent::EditMessage(_) => "edit_message",
            ClientEvent::DeleteMessage(_) => "delete_message",
        }
    }
}

/// Auth success response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyPayload {
    pub user_id: UserId,
    pub username: String,
}

/// Per-event failure surfaced to the originating connection only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
}

impl From<HubError> for ErrorPayload {
    fn from(err: HubError) -> Self {
        Self {
            error: err.to_string(),
        }
    }
}

/// Acknowledgment to the sender after a message commits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSentPayload {
    pub message_id: MessageId,
}

/// Typing indicator broadcast
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub user_id: UserId,
    pub username: String,
    pub conversation_id: ConversationId,
}

/// Typing-stop broadcast
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTypingPayload {
    pub user_id: UserId,
    pub conversation_id: ConversationId,
}

/// Reaction set broadcast for one message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionPayload {
    pub message_id: MessageId,
    pub reactions: Vec<Reaction>,
}

/// Presence transition to online
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlinePayload {
    pub user_id: UserId,
    pub username: String,
    pub is_online: bool,
}

/// Presence transition to offline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflinePayload {
    pub user_id: UserId,
    pub username: String,
    pub is_online: bool,
    pub last_seen: u64,
}

/// Events pushed to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    Ready(ReadyPayload),
    AuthError(ErrorPayload),
    NewMessage(MessageRecord),
    MessageSent(MessageSentPayload),
    MessageError(ErrorPayload),
    UserTyping(TypingPayload),
    UserStopTyping(StopTypingPayload),
    MessageReaction(ReactionPayload),
    ReactionError(ErrorPayload),
    MessageEdited(MessageRecord),
    EditError(ErrorPayload),
    MessageDeleted(MessageRef),
    DeleteError(ErrorPayload),
    UserOnline(OnlinePayload),
    UserOffline(OfflinePayload),
}

impl ServerEvent {
    /// Encode this event into a wire-ready frame
    ///
    /// Broadcasts encode once and fan the same bytes out to every target.
    pub fn encode(&self) -> Result<Bytes> {
        let body = serde_json::to_vec(self)?;
        Ok(encode_frame(&body))
    }

    /// Decode a server event from a frame body (client side, and tests)
    pub fn decode(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body)
            .map_err(|e| HubError::serialization(format!("malformed event: {}", e)))
    }

    /// Error counterpart for a client event name, if the event has one
    ///
    /// Events without an error counterpart (joins, typing) report nothing
    /// back; their failures are dropped.
    pub fn error_for(event: &str, err: HubError) -> Option<Self> {
        let payload = ErrorPayload::from(err);
        match event {
            "send_message" => Some(ServerEvent::MessageError(payload)),
            "add_reaction" => Some(ServerEvent::ReactionError(payload)),
            "edit_message" => Some(ServerEvent::EditError(payload)),
            "delete_message" => Some(ServerEvent::DeleteError(payload)),
            _ => None,
        }
    }

    /// Wire name of this event
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Ready(_) => "ready",
            ServerEvent::AuthError(_) => "auth_error",
            ServerEvent::NewMessage(_) => "new_message",
            ServerEvent::MessageSent(_) => "message_sent",
            ServerEvent::MessageError(_) => "message_error",
            ServerEvent::UserTyping(_) => "user_typing",
            ServerEvent::UserStopTyping(_) => "user_stop_typing",
            ServerEvent::MessageReaction(_) => "message_reaction",
            ServerEvent::ReactionError(_) => "reaction_error",
            ServerEvent::MessageEdited(_) => "message_edited",
            ServerEvent::EditError(_) => "edit_error",
            ServerEvent::MessageDeleted(_) => "message_deleted",
            ServerEvent::DeleteError(_) => "delete_error",
            ServerEvent::UserOnline(_) => "user_online",
            ServerEvent::UserOffline(_) => "user_offline",
        }
    }
}
