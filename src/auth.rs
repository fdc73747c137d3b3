//! Authentication provider contract
//!
//! Credentials are verified once, at connection establishment. A connection
//! that fails authentication is closed before it ever becomes a session.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{HubError, Result};
use crate::UserId;

/// An authenticated identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub username: String,
}

/// Contract for verifying connection credentials
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Verify a token, returning the identity it belongs to
    async fn authenticate(&self, token: &str) -> Result<Identity>;
}

/// Static token table, for development and tests
#[derive(Default)]
pub struct StaticTokenAuth {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenAuth {
    /// Create an empty token table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token for an identity
    pub fn insert(&mut self, token: impl Into<String>, identity: Identity) {
        self.tokens.insert(token.into(), identity);
    }

    /// Number of registered tokens
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl FromIterator<(String, Identity)> for StaticTokenAuth {
    fn from_iter<I: IntoIterator<Item = (String, Identity)>>(iter: I) -> Self {
        Self {
            tokens: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl AuthProvider for StaticTokenAuth {
    async fn authenticate(&self, token: &str) -> Result<Identity> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| HubError::auth("invalid token"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_known_token() {
        let mut auth = StaticTokenAuth::new();
        auth.insert(
            "secret",
            Identity {
                user_id: "u1".to_string(),
                username: "alice".to_string(),
            },
        );

        let identity = auth.authenticate("secret").await.unwrap();
        assert_eq!(identity.username, "alice");
    }

    #[tokio::test]
    async fn test_unknown_token_fails() {
        let auth = StaticTokenAuth::new();
        let result = auth.authenticate("nope").await;
        assert!(matches!(result, Err(HubError::Auth(_))));
    }
}
