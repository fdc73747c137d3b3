//! Event routing
//!
//! One router instance serves all connections. Every client event lands
//! here after the auth handshake; handlers validate, commit to the store,
//! and only then broadcast. Failures surface as per-event error events to
//! the originating connection and are never fanned out to the room.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{HubError, Result};
use crate::protocol::events::{
    AddReactionPayload, ClientEvent, ConversationRef, EditMessagePayload, MessageRef,
    MessageSentPayload, ReactionPayload, SendMessagePayload, ServerEvent, StopTypingPayload,
    TypingPayload,
};
use crate::server::registry::RoomRegistry;
use crate::server::session::Session;
use crate::store::{ConversationRecord, MessageRecord, NewMessage, Store, UserInfo};
use crate::{current_timestamp, ConversationId};

/// Edits are accepted for 15 minutes after the message was created
pub const EDIT_WINDOW_MS: u64 = 15 * 60 * 1000;

/// Routes client events to store mutations and room broadcasts
pub struct EventRouter {
    store: Arc<dyn Store>,
    registry: Arc<RoomRegistry>,
}

impl EventRouter {
    pub fn new(store: Arc<dyn Store>, registry: Arc<RoomRegistry>) -> Self {
        Self { store, registry }
    }

    /// Handle one client event from an authenticated session
    ///
    /// Domain failures are converted into the event's error counterpart and
    /// sent to the originating session only; they never tear down the
    /// connection.
    pub async fn handle(&self, session: &Session, event: ClientEvent) -> Result<()> {
        match event {
            ClientEvent::Authenticate(_) => {
                // Handshake already completed for this connection
                warn!(conn_id = %session.conn_id, "ignoring authenticate on active session");
                Ok(())
            }
            ClientEvent::JoinConversation(p) => self.handle_join(session, p).await,
            ClientEvent::LeaveConversation(p) => self.handle_leave(session, p).await,
            ClientEvent::SendMessage(p) => {
                if let Err(err) = self.handle_send(session, p).await {
                    self.reply_error(session, ServerEvent::MessageError(err.into()));
                }
                Ok(())
            }
            ClientEvent::TypingStart(p) => self.handle_typing(session, p, true).await,
            ClientEvent::TypingStop(p) => self.handle_typing(session, p, false).await,
            ClientEvent::AddReaction(p) => {
                if let Err(err) = self.handle_reaction(session, p).await {
                    self.reply_error(session, ServerEvent::ReactionError(err.into()));
                }
                Ok(())
            }
            ClientEvent::EditMessage(p) => {
                if let Err(err) = self.handle_edit(session, p).await {
                    self.reply_error(session, ServerEvent::EditError(err.into()));
                }
                Ok(())
            }
            ClientEvent::DeleteMessage(p) => {
                if let Err(err) = self.handle_delete(session, p).await {
                    self.reply_error(session, ServerEvent::DeleteError(err.into()));
                }
                Ok(())
            }
        }
    }

    /// Send an error event back to the originating session
    ///
    /// A failure here means the connection is already gone; cleanup happens
    /// on the disconnect path.
    fn reply_error(&self, session: &Session, event: ServerEvent) {
        debug!(conn_id = %session.conn_id, event = event.name(), "replying with error");
        let _ = session.send(&event);
    }

    async fn handle_join(&self, session: &Session, payload: ConversationRef) -> Result<()> {
        let room = payload.conversation_id;

        // Membership comes from the store; subscription state is never
        // consulted for authorization. A non-participant join is dropped
        // without a response, matching the quiet failure mode of leave.
        if !self.store.is_participant(&room, &session.user_id).await? {
            warn!(
                conn_id = %session.conn_id,
                user_id = %session.user_id,
                room = %room,
                "join refused: not a participant"
            );
            return Ok(());
        }

        self.registry.join(&room, &session.conn_id, session.sender()).await;
        session.note_join(&room).await;
        debug!(conn_id = %session.conn_id, room = %room, "joined conversation");
        Ok(())
    }

    async fn handle_leave(&self, session: &Session, payload: ConversationRef) -> Result<()> {
        let room = payload.conversation_id;
        self.registry.leave(&room, &session.conn_id).await;
        session.note_leave(&room).await;
        debug!(conn_id = %session.conn_id, room = %room, "left conversation");
        Ok(())
    }

    async fn handle_send(&self, session: &Session, payload: SendMessagePayload) -> Result<()> {
        if payload.content.trim().is_empty() {
            return Err(HubError::validation("message content must not be empty"));
        }

        let conversation = self.require_conversation(&payload.conversation_id).await?;
        self.require_participant(&conversation, session)?;

        // Commit and broadcast under the room lock so every subscriber sees
        // this room's messages in commit order.
        let lock = self.registry.room_lock(&conversation.id).await;
        let _guard = lock.lock().await;

        let record = self
            .store
            .append_message(NewMessage {
                conversation_id: payload.conversation_id,
                sender: UserInfo {
                    user_id: session.user_id.clone(),
                    username: session.username.clone(),
                },
                content: payload.content,
                kind: payload.kind,
                reply_to: payload.reply_to,
            })
            .await?;

        let message_id = record.id.clone();
        let frame = ServerEvent::NewMessage(record).encode()?;
        let delivered = self.registry.broadcast(&conversation.id, &frame, None).await;
        debug!(
            message_id = %message_id,
            room = %conversation.id,
            delivered,
            "message committed and broadcast"
        );

        // Ack after the broadcast so the sender's new_message precedes it
        let _ = session.send(&ServerEvent::MessageSent(MessageSentPayload { message_id }));
        Ok(())
    }

    async fn handle_typing(
        &self,
        session: &Session,
        payload: ConversationRef,
        started: bool,
    ) -> Result<()> {
        let room = payload.conversation_id;

        // Typing is best-effort: failures are dropped without a reply
        if !self.store.is_participant(&room, &session.user_id).await? {
            return Ok(());
        }

        let event = if started {
            session.mark_typing(&room, current_timestamp()).await;
            ServerEvent::UserTyping(TypingPayload {
                user_id: session.user_id.clone(),
                username: session.username.clone(),
                conversation_id: room.clone(),
            })
        } else {
            session.clear_typing(&room).await;
            ServerEvent::UserStopTyping(StopTypingPayload {
                user_id: session.user_id.clone(),
                conversation_id: room.clone(),
            })
        };

        // Typing shares the room's sequencing lock with the message path,
        // so an indicator is never observed out of order with a
        // concurrently committed message
        let frame = event.encode()?;
        let lock = self.registry.room_lock(&room).await;
        let _guard = lock.lock().await;
        self.registry
            .broadcast(&room, &frame, Some(&session.conn_id))
            .await;
        Ok(())
    }

    async fn handle_reaction(&self, session: &Session, payload: AddReactionPayload) -> Result<()> {
        let message = self.require_message(&payload.message_id).await?;
        let conversation = self.require_conversation(&message.conversation_id).await?;
        self.require_participant(&conversation, session)?;

        let lock = self.registry.room_lock(&conversation.id).await;
        let _guard = lock.lock().await;

        let user = UserInfo {
            user_id: session.user_id.clone(),
            username: session.username.clone(),
        };
        let updated = self
            .store
            .upsert_reaction(&payload.message_id, &user, &payload.emoji, current_timestamp())
            .await?;

        // The full reaction set goes out, not a delta, so receivers never
        // need to reconcile
        let frame = ServerEvent::MessageReaction(ReactionPayload {
            message_id: updated.id,
            reactions: updated.reactions,
        })
        .encode()?;
        self.registry.broadcast(&conversation.id, &frame, None).await;
        Ok(())
    }

    async fn handle_edit(&self, session: &Session, payload: EditMessagePayload) -> Result<()> {
        if payload.content.trim().is_empty() {
            return Err(HubError::validation("message content must not be empty"));
        }

        let message = self.require_message(&payload.message_id).await?;
        self.require_author(&message, session, "edit")?;

        if current_timestamp().saturating_sub(message.created_at) > EDIT_WINDOW_MS {
            return Err(HubError::stale_state(
                "message can only be edited within 15 minutes",
            ));
        }

        let lock = self.registry.room_lock(&message.conversation_id).await;
        let _guard = lock.lock().await;

        // The store re-checks the deleted flag at mutation time, so a delete
        // that won the race still dominates this edit
        let updated = self
            .store
            .edit_message(&payload.message_id, &payload.content, current_timestamp())
            .await?;

        let room = updated.conversation_id.clone();
        let frame = ServerEvent::MessageEdited(updated).encode()?;
        self.registry.broadcast(&room, &frame, None).await;
        Ok(())
    }

    async fn handle_delete(&self, session: &Session, payload: MessageRef) -> Result<()> {
        let message = self.require_message(&payload.message_id).await?;
        self.require_author(&message, session, "delete")?;

        let lock = self.registry.room_lock(&message.conversation_id).await;
        let _guard = lock.lock().await;

        let deleted = self
            .store
            .soft_delete_message(&payload.message_id, &session.user_id, current_timestamp())
            .await?;

        let frame = ServerEvent::MessageDeleted(MessageRef {
            message_id: deleted.id,
        })
        .encode()?;
        self.registry
            .broadcast(&deleted.conversation_id, &frame, None)
            .await;
        Ok(())
    }

    async fn require_conversation(&self, id: &ConversationId) -> Result<ConversationRecord> {
        self.store
            .conversation(id)
            .await?
            .ok_or_else(|| HubError::not_found("Conversation"))
    }

    async fn require_message(&self, id: &crate::MessageId) -> Result<MessageRecord> {
        self.store
            .message(id)
            .await?
            .ok_or_else(|| HubError::not_found("Message"))
    }

    fn require_participant(
        &self,
        conversation: &ConversationRecord,
        session: &Session,
    ) -> Result<()> {
        if conversation.has_participant(&session.user_id) {
            Ok(())
        } else {
            Err(HubError::authorization(
                "not a participant of this conversation",
            ))
        }
    }

    fn require_author(&self, message: &MessageRecord, session: &Session, action: &str) -> Result<()> {
        if message.sender.user_id == session.user_id {
            Ok(())
        } else {
            Err(HubError::authorization(format!(
                "only the author can {} a message",
                action
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::sync::mpsc;

    use crate::protocol::events::AuthenticatePayload;
    use crate::protocol::frame::FRAME_HEADER_SIZE;
    use crate::store::{ConversationKind, EditState, MemoryStore, MessageKind};

    struct Peer {
        session: Arc<Session>,
        rx: mpsc::UnboundedReceiver<Bytes>,
    }

    impl Peer {
        fn new(user_id: &str, username: &str) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            Self {
                session: Arc::new(Session::new(user_id.to_string(), username.to_string(), tx)),
                rx,
            }
        }

        fn recv(&mut self) -> ServerEvent {
            let frame = self.rx.try_recv().expect("expected a queued event");
            ServerEvent::decode(&frame[FRAME_HEADER_SIZE..]).unwrap()
        }

        fn try_recv(&mut self) -> Option<ServerEvent> {
            self.rx
                .try_recv()
                .ok()
                .map(|frame| ServerEvent::decode(&frame[FRAME_HEADER_SIZE..]).unwrap())
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        router: EventRouter,
        room: ConversationId,
        alice: Peer,
        bob: Peer,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(RoomRegistry::new());
        let router = EventRouter::new(store.clone(), registry.clone());

        let conversation = store
            .create_conversation(
                vec!["u-alice".to_string(), "u-bob".to_string()],
                ConversationKind::Direct,
                None,
                "u-alice".to_string(),
            )
            .await;

        let alice = Peer::new("u-alice", "alice");
        let bob = Peer::new("u-bob", "bob");

        for peer in [&alice, &bob] {
            router
                .handle(
                    &peer.session,
                    ClientEvent::JoinConversation(ConversationRef {
                        conversation_id: conversation.id.clone(),
                    }),
                )
                .await
                .unwrap();
        }

        Fixture {
            store,
            router,
            room: conversation.id,
            alice,
            bob,
        }
    }

    fn send_payload(room: &ConversationId, content: &str) -> ClientEvent {
        ClientEvent::SendMessage(SendMessagePayload {
            conversation_id: room.clone(),
            content: content.to_string(),
            kind: MessageKind::Text,
            reply_to: None,
        })
    }

    #[tokio::test]
    async fn test_send_message_broadcasts_then_acks_sender() {
        let mut f = fixture().await;

        f.router
            .handle(&f.alice.session, send_payload(&f.room, "hello"))
            .await
            .unwrap();

        // Both participants get the broadcast, sender included
        let to_bob = f.bob.recv();
        assert_eq!(to_bob.name(), "new_message");
        match to_bob {
            ServerEvent::NewMessage(record) => {
                assert_eq!(record.content, "hello");
                assert_eq!(record.sender.username, "alice");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        // Sender sees the broadcast first, then the ack
        assert_eq!(f.alice.recv().name(), "new_message");
        assert_eq!(f.alice.recv().name(), "message_sent");
        assert!(f.alice.try_recv().is_none());
        assert!(f.bob.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_empty_content_is_message_error_to_sender_only() {
        let mut f = fixture().await;

        f.router
            .handle(&f.alice.session, send_payload(&f.room, "   "))
            .await
            .unwrap();

        assert_eq!(f.alice.recv().name(), "message_error");
        assert!(f.bob.try_recv().is_none());
        assert_eq!(f.store.message_count().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_message_error() {
        let mut f = fixture().await;

        f.router
            .handle(
                &f.alice.session,
                send_payload(&"missing".to_string(), "hello"),
            )
            .await
            .unwrap();

        match f.alice.recv() {
            ServerEvent::MessageError(p) => assert!(p.error.contains("not found")),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_participant_send_is_rejected() {
        let mut f = fixture().await;
        let mut mallory = Peer::new("u-mallory", "mallory");

        f.router
            .handle(&mallory.session, send_payload(&f.room, "hi there"))
            .await
            .unwrap();

        assert_eq!(mallory.recv().name(), "message_error");
        assert!(f.alice.try_recv().is_none());
        assert!(f.bob.try_recv().is_none());
        assert_eq!(f.store.message_count().await, 0);
    }

    #[tokio::test]
    async fn test_non_participant_join_is_silently_ignored() {
        let mut f = fixture().await;
        let mut mallory = Peer::new("u-mallory", "mallory");

        f.router
            .handle(
                &mallory.session,
                ClientEvent::JoinConversation(ConversationRef {
                    conversation_id: f.room.clone(),
                }),
            )
            .await
            .unwrap();

        assert!(mallory.try_recv().is_none());
        assert!(!mallory.session.is_joined(&f.room).await);

        // A broadcast in the room does not reach the refused connection
        f.router
            .handle(&f.alice.session, send_payload(&f.room, "secret"))
            .await
            .unwrap();
        assert!(mallory.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_typing_excludes_sender() {
        let mut f = fixture().await;

        f.router
            .handle(
                &f.alice.session,
                ClientEvent::TypingStart(ConversationRef {
                    conversation_id: f.room.clone(),
                }),
            )
            .await
            .unwrap();

        match f.bob.recv() {
            ServerEvent::UserTyping(p) => {
                assert_eq!(p.username, "alice");
                assert_eq!(p.conversation_id, f.room);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(f.alice.try_recv().is_none());

        f.router
            .handle(
                &f.alice.session,
                ClientEvent::TypingStop(ConversationRef {
                    conversation_id: f.room.clone(),
                }),
            )
            .await
            .unwrap();

        assert_eq!(f.bob.recv().name(), "user_stop_typing");
        assert!(f.alice.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_typing_waits_for_room_sequencing_lock() {
        let mut f = fixture().await;

        // Hold the room's sequencing lock as a concurrent message commit
        // would, then start a typing broadcast
        let lock = f.router.registry.room_lock(&f.room).await;
        let guard = lock.lock().await;

        let router = Arc::new(f.router);
        let alice = Arc::clone(&f.alice.session);
        let room = f.room.clone();
        let task = {
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                router
                    .handle(
                        &alice,
                        ClientEvent::TypingStart(ConversationRef {
                            conversation_id: room,
                        }),
                    )
                    .await
                    .unwrap();
            })
        };

        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
        assert!(f.bob.try_recv().is_none());

        drop(guard);
        task.await.unwrap();
        assert_eq!(f.bob.recv().name(), "user_typing");
    }

    #[tokio::test]
    async fn test_reaction_broadcasts_full_set_and_replaces() {
        let mut f = fixture().await;

        f.router
            .handle(&f.alice.session, send_payload(&f.room, "react to me"))
            .await
            .unwrap();
        let message_id = match f.bob.recv() {
            ServerEvent::NewMessage(record) => record.id,
            other => panic!("unexpected event: {:?}", other),
        };
        f.alice.recv();
        f.alice.recv();

        f.router
            .handle(
                &f.bob.session,
                ClientEvent::AddReaction(AddReactionPayload {
                    message_id: message_id.clone(),
                    emoji: "👍".to_string(),
                }),
            )
            .await
            .unwrap();

        match f.alice.recv() {
            ServerEvent::MessageReaction(p) => {
                assert_eq!(p.reactions.len(), 1);
                assert_eq!(p.reactions[0].emoji, "👍");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        f.bob.recv();

        // Same user reacts again: the prior reaction is replaced
        f.router
            .handle(
                &f.bob.session,
                ClientEvent::AddReaction(AddReactionPayload {
                    message_id,
                    emoji: "❤️".to_string(),
                }),
            )
            .await
            .unwrap();

        match f.alice.recv() {
            ServerEvent::MessageReaction(p) => {
                assert_eq!(p.reactions.len(), 1);
                assert_eq!(p.reactions[0].emoji, "❤️");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_edit_by_author_broadcasts() {
        let mut f = fixture().await;

        f.router
            .handle(&f.alice.session, send_payload(&f.room, "typo"))
            .await
            .unwrap();
        let message_id = match f.bob.recv() {
            ServerEvent::NewMessage(record) => record.id,
            other => panic!("unexpected event: {:?}", other),
        };
        f.alice.recv();
        f.alice.recv();

        f.router
            .handle(
                &f.alice.session,
                ClientEvent::EditMessage(EditMessagePayload {
                    message_id,
                    content: "fixed".to_string(),
                }),
            )
            .await
            .unwrap();

        match f.bob.recv() {
            ServerEvent::MessageEdited(record) => {
                assert_eq!(record.content, "fixed");
                assert!(record.edited.is_edited);
                assert_eq!(record.edited.original_content.as_deref(), Some("typo"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_edit_by_non_author_is_edit_error() {
        let mut f = fixture().await;

        f.router
            .handle(&f.alice.session, send_payload(&f.room, "mine"))
            .await
            .unwrap();
        let message_id = match f.bob.recv() {
            ServerEvent::NewMessage(record) => record.id,
            other => panic!("unexpected event: {:?}", other),
        };
        f.alice.recv();
        f.alice.recv();

        f.router
            .handle(
                &f.bob.session,
                ClientEvent::EditMessage(EditMessagePayload {
                    message_id: message_id.clone(),
                    content: "hijacked".to_string(),
                }),
            )
            .await
            .unwrap();

        assert_eq!(f.bob.recv().name(), "edit_error");
        assert!(f.alice.try_recv().is_none());

        let stored = f.store.message(&message_id).await.unwrap().unwrap();
        assert_eq!(stored.content, "mine");
    }

    #[tokio::test]
    async fn test_edit_outside_window_is_edit_error() {
        let mut f = fixture().await;

        // Seed a message created well past the edit window
        let message = MessageRecord {
            id: "m-old".to_string(),
            conversation_id: f.room.clone(),
            sender: UserInfo {
                user_id: "u-alice".to_string(),
                username: "alice".to_string(),
            },
            content: "ancient".to_string(),
            kind: MessageKind::Text,
            reply_to: None,
            created_at: current_timestamp() - EDIT_WINDOW_MS - 1000,
            edited: EditState::default(),
            reactions: Vec::new(),
            read_by: Vec::new(),
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
        };
        f.store.insert_message(message).await;

        f.router
            .handle(
                &f.alice.session,
                ClientEvent::EditMessage(EditMessagePayload {
                    message_id: "m-old".to_string(),
                    content: "too late".to_string(),
                }),
            )
            .await
            .unwrap();

        match f.alice.recv() {
            ServerEvent::EditError(p) => assert!(p.error.contains("15 minutes")),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(f.bob.try_recv().is_none());

        let stored = f.store.message(&"m-old".to_string()).await.unwrap().unwrap();
        assert_eq!(stored.content, "ancient");
    }

    #[tokio::test]
    async fn test_delete_broadcasts_and_blocks_later_edit() {
        let mut f = fixture().await;

        f.router
            .handle(&f.alice.session, send_payload(&f.room, "going away"))
            .await
            .unwrap();
        let message_id = match f.bob.recv() {
            ServerEvent::NewMessage(record) => record.id,
            other => panic!("unexpected event: {:?}", other),
        };
        f.alice.recv();
        f.alice.recv();

        f.router
            .handle(
                &f.alice.session,
                ClientEvent::DeleteMessage(MessageRef {
                    message_id: message_id.clone(),
                }),
            )
            .await
            .unwrap();

        match f.bob.recv() {
            ServerEvent::MessageDeleted(p) => assert_eq!(p.message_id, message_id),
            other => panic!("unexpected event: {:?}", other),
        }
        f.alice.recv();

        // A stale edit after the delete fails and never resurrects content
        f.router
            .handle(
                &f.alice.session,
                ClientEvent::EditMessage(EditMessagePayload {
                    message_id: message_id.clone(),
                    content: "resurrect".to_string(),
                }),
            )
            .await
            .unwrap();

        assert_eq!(f.alice.recv().name(), "edit_error");
        assert!(f.bob.try_recv().is_none());

        let stored = f.store.message(&message_id).await.unwrap().unwrap();
        assert!(stored.is_deleted);
        assert_eq!(stored.content, "going away");
    }

    #[tokio::test]
    async fn test_delete_by_non_author_is_delete_error() {
        let mut f = fixture().await;

        f.router
            .handle(&f.alice.session, send_payload(&f.room, "keep me"))
            .await
            .unwrap();
        let message_id = match f.bob.recv() {
            ServerEvent::NewMessage(record) => record.id,
            other => panic!("unexpected event: {:?}", other),
        };
        f.alice.recv();
        f.alice.recv();

        f.router
            .handle(
                &f.bob.session,
                ClientEvent::DeleteMessage(MessageRef { message_id }),
            )
            .await
            .unwrap();

        assert_eq!(f.bob.recv().name(), "delete_error");
        assert!(f.alice.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_rooms_are_isolated() {
        let mut f = fixture().await;

        // Second conversation shared by both users, but only alice joins it
        let side_room = f
            .store
            .create_conversation(
                vec!["u-alice".to_string(), "u-bob".to_string()],
                ConversationKind::Direct,
                None,
                "u-alice".to_string(),
            )
            .await
            .id;
        f.router
            .handle(
                &f.alice.session,
                ClientEvent::JoinConversation(ConversationRef {
                    conversation_id: side_room.clone(),
                }),
            )
            .await
            .unwrap();

        f.router
            .handle(&f.alice.session, send_payload(&side_room, "side channel"))
            .await
            .unwrap();

        // Bob is a participant but not subscribed, so nothing reaches him
        assert!(f.bob.try_recv().is_none());
        assert_eq!(f.alice.recv().name(), "new_message");
        assert_eq!(f.alice.recv().name(), "message_sent");
    }

    #[tokio::test]
    async fn test_leave_stops_delivery() {
        let mut f = fixture().await;

        f.router
            .handle(
                &f.bob.session,
                ClientEvent::LeaveConversation(ConversationRef {
                    conversation_id: f.room.clone(),
                }),
            )
            .await
            .unwrap();

        f.router
            .handle(&f.alice.session, send_payload(&f.room, "anyone there?"))
            .await
            .unwrap();

        assert!(f.bob.try_recv().is_none());
        assert_eq!(f.alice.recv().name(), "new_message");
        assert_eq!(f.alice.recv().name(), "message_sent");
    }

    #[tokio::test]
    async fn test_dead_subscriber_does_not_block_broadcast() {
        let mut f = fixture().await;
        drop(f.bob.rx);

        f.router
            .handle(&f.alice.session, send_payload(&f.room, "still flowing"))
            .await
            .unwrap();

        assert_eq!(f.alice.recv().name(), "new_message");
        assert_eq!(f.alice.recv().name(), "message_sent");
    }

    #[tokio::test]
    async fn test_authenticate_on_active_session_is_ignored() {
        let mut f = fixture().await;

        f.router
            .handle(
                &f.alice.session,
                ClientEvent::Authenticate(AuthenticatePayload {
                    token: "again".to_string(),
                }),
            )
            .await
            .unwrap();

        assert!(f.alice.try_recv().is_none());
    }
}
