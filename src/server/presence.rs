//! Presence store
//!
//! Tracks per-user connection counts so multi-device users stay online
//! until their last connection drops. Both transitions (0 to 1 and 1 to 0)
//! are decided under a single write lock, so concurrent connects and
//! disconnects for the same user settle to exactly one broadcast each.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::{current_timestamp, UserId};

/// Presence state for one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceRecord {
    pub user_id: UserId,
    pub username: String,
    pub is_online: bool,
    pub connection_count: u32,
    /// Unix ms of the most recent transition to offline
    pub last_seen: u64,
}

/// Connection-counted presence tracking
#[derive(Default)]
pub struct PresenceStore {
    records: RwLock<HashMap<UserId, PresenceRecord>>,
}

impl PresenceStore {
    /// Create an empty presence store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for a user
    ///
    /// Returns true only on the offline-to-online transition; callers
    /// broadcast `user_online` exactly when this returns true.
    pub async fn connect(&self, user_id: &UserId, username: &str) -> bool {
        let mut records = self.records.write().await;
        let record = records
            .entry(user_id.clone())
            .or_insert_with(|| PresenceRecord {
                user_id: user_id.clone(),
                username: username.to_string(),
                is_online: false,
                connection_count: 0,
                last_seen: current_timestamp(),
            });

        record.username = username.to_string();
        record.connection_count += 1;

        let came_online = !record.is_online;
        record.is_online = true;
        came_online
    }

    /// Unregister a connection for a user
    ///
    /// Returns the recorded last-seen timestamp only on the online-to-offline
    /// transition; callers broadcast `user_offline` exactly when this returns
    /// Some. Unknown users and already-offline users return None. The record
    /// is retained so last-seen survives the disconnect.
    pub async fn disconnect(&self, user_id: &UserId) -> Option<u64> {
        let mut records = self.records.write().await;
        let record = records.get_mut(user_id)?;

        if record.connection_count == 0 {
            return None;
        }

        record.connection_count -= 1;
        if record.connection_count > 0 {
            return None;
        }

        record.is_online = false;
        record.last_seen = current_timestamp();
        Some(record.last_seen)
    }

    /// Whether a user has at least one live connection
    pub async fn is_online(&self, user_id: &UserId) -> bool {
        self.records
            .read()
            .await
            .get(user_id)
            .map(|r| r.is_online)
            .unwrap_or(false)
    }

    /// Live connection count for a user
    pub async fn connection_count(&self, user_id: &UserId) -> u32 {
        self.records
            .read()
            .await
            .get(user_id)
            .map(|r| r.connection_count)
            .unwrap_or(0)
    }

    /// Presence record for a user, if one was ever created
    pub async fn record(&self, user_id: &UserId) -> Option<PresenceRecord> {
        self.records.read().await.get(user_id).cloned()
    }

    /// Snapshot of all currently-online users
    pub async fn online_users(&self) -> Vec<PresenceRecord> {
        self.records
            .read()
            .await
            .values()
            .filter(|r| r.is_online)
            .cloned()
            .collect()
    }
}
