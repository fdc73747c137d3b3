//! QUIC-based real-time messaging hub
//!
//! This library provides the connection/room broker for a chat system:
//! clients hold one QUIC connection with a single bidirectional control
//! stream carrying length-prefixed JSON events. The broker authenticates
//! each connection, tracks user presence, and fans room events out to
//! every subscribed session.
//!
//! Persistence and credential verification are external collaborators,
//! expressed as the [`store::Store`] and [`auth::AuthProvider`] contracts.

pub mod auth;
pub mod error;
pub mod protocol;
pub mod server;
pub mod store;

pub use auth::{AuthProvider, Identity, StaticTokenAuth};
pub use error::{HubError, Result};
pub use server::broker::{Broker, BrokerConfig};
pub use store::{MemoryStore, Store};

use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// User identifier, assigned by the authentication provider
pub type UserId = String;

/// Conversation identifier; one conversation backs one broadcast room
pub type ConversationId = String;

/// Message identifier
pub type MessageId = String;

/// Connection identifier; names one live transport channel
pub type ConnectionId = String;

/// Generate a unique identifier
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Get current timestamp in milliseconds since UNIX epoch
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
