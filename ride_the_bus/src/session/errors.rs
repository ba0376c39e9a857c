//! Session store error types.

use crate::game::{ErrorKind, GameError};
use std::time::Duration;
use thiserror::Error;

/// Failures talking to the persistence backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Redis error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Backend call did not complete in time
    #[error("Backend operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Session store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// No live session under this code
    #[error("Session {0} not found")]
    NotFound(String),

    /// Session is shutting down and no longer accepts players
    #[error("Session is closing")]
    SessionClosing,

    /// Join name was empty after trimming
    #[error("Name required")]
    NameRequired,

    /// Engine rejected the transition
    #[error(transparent)]
    Game(#[from] GameError),

    /// Code generator kept producing codes already in use
    #[error("Could not allocate a lobby code after {0} attempts")]
    CodesExhausted(usize),

    /// Compare-and-swap kept losing to concurrent writers
    #[error("Session {code} is busy after {attempts} write attempts")]
    Contention { code: String, attempts: usize },

    /// A deferred action's tag no longer matches the stored session
    #[error("Scheduled action superseded")]
    Superseded,

    /// Backend error
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Stored record could not be encoded or decoded
    #[error("Corrupt session record: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Classify the failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) | StoreError::NameRequired => ErrorKind::Validation,
            StoreError::SessionClosing => ErrorKind::State,
            StoreError::Game(e) => e.kind(),
            StoreError::Contention { .. } | StoreError::Superseded => ErrorKind::Concurrency,
            StoreError::CodesExhausted(_)
            | StoreError::Backend(_)
            | StoreError::Serialization(_) => ErrorKind::Resource,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// Get a client-safe error message that doesn't leak backend details
    pub fn client_message(&self) -> String {
        match self {
            StoreError::NotFound(_) => "Session not found".to_string(),
            StoreError::Backend(_) | StoreError::Serialization(_) => {
                "Internal server error".to_string()
            }
            StoreError::CodesExhausted(_) => "No lobby codes available, try again".to_string(),
            StoreError::Contention { .. } => "Session busy, try again".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
