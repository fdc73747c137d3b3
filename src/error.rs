//! Error handling for the messaging hub

use thiserror::Error;

/// Result type alias for hub operations
pub type Result<T> = std::result::Result<T, HubError>;

/// Hub error types
///
/// The first five variants are the per-event error kinds surfaced to the
/// originating connection; the rest cover transport and setup failures.
#[derive(Debug, Clone, Error)]
pub enum HubError {
    /// Malformed or missing event fields
    #[error("Invalid event: {0}")]
    Validation(String),
    /// Identity is not a participant of the named conversation
    #[error("Not authorized: {0}")]
    Authorization(String),
    /// Referenced conversation/message no longer exists
    #[error("{0} not found")]
    NotFound(String),
    /// Mutation arrived too late (edit window elapsed, message deleted)
    #[error("Stale state: {0}")]
    StaleState(String),
    /// Failed to deliver to one subscriber
    #[error("Delivery failed: {0}")]
    Transport(String),
    /// Connection credentials rejected
    #[error("Authentication failed: {0}")]
    Auth(String),
    /// Transport-level connection failure
    #[error("Connection error: {0}")]
    Connection(String),
    /// Frame or payload encoding/decoding failure
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Broker setup failure
    #[error("Configuration error: {0}")]
    Config(String),
    /// Unexpected internal failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HubError {
    /// Get error code for this error type
    pub fn code(&self) -> u32 {
        match self {
            HubError::Validation(_) => 1000,
            HubError::Authorization(_) => 1001,
            HubError::NotFound(_) => 1002,
            HubError::StaleState(_) => 1003,
            HubError::Transport(_) => 1004,
            HubError::Auth(_) => 1005,
            HubError::Connection(_) => 1006,
            HubError::Serialization(_) => 1007,
            HubError::Config(_) => 1008,
            HubError::Internal(_) => 1009,
        }
    }

    /// Create a validation error
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        HubError::Validation(msg.into())
    }

    /// Create an authorization error
    pub fn authorization<T: Into<String>>(msg: T) -> Self {
        HubError::Authorization(msg.into())
    }

    /// Create a not-found error
    pub fn not_found<T: Into<String>>(entity: T) -> Self {
        HubError::NotFound(entity.into())
    }

    /// Create a stale-state error
    pub fn stale_state<T: Into<String>>(msg: T) -> Self {
        HubError::StaleState(msg.into())
    }

    /// Create a transport error
    pub fn transport<T: Into<String>>(msg: T) -> Self {
        HubError::Transport(msg.into())
    }

    /// Create an authentication error
    pub fn auth<T: Into<String>>(msg: T) -> Self {
        HubError::Auth(msg.into())
    }

    /// Create a connection error
    pub fn connection<T: Into<String>>(msg: T) -> Self {
        HubError::Connection(msg.into())
    }

    /// Create a serialization error
    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        HubError::Serialization(msg.into())
    }

    /// Create a configuration error
    pub fn config<T: Into<String>>(msg: T) -> Self {
        HubError::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal<T: Into<String>>(msg: T) -> Self {
        HubError::Internal(msg.into())
    }
}

impl From<std::io::Error> for HubError {
    fn from(err: std::io::Error) -> Self {
        HubError::Connection(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        HubError::Serialization(format!("JSON error: {}", err))
    }
}

impl From<quinn::ConnectionError> for HubError {
    fn from(err: quinn::ConnectionError) -> Self {
        HubError::Connection(format!("QUIC connection error: {}", err))
    }
}

impl From<quinn::ReadError> for HubError {
    fn from(err: quinn::ReadError) -> Self {
        HubError::Connection(format!("QUIC read error: {}", err))
    }
}

impl From<quinn::WriteError> for HubError {
    fn from(err: quinn::WriteError) -> Self {
        HubError::Transport(format!("QUIC write error: {}", err))
    }
}

impl From<quinn::ClosedStream> for HubError {
    fn from(err: quinn::ClosedStream) -> Self {
        HubError::Connection(format!("Stream closed: {}", err))
    }
}
