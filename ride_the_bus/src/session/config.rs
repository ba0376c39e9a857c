//! Session store configuration.

use super::backend::DEFAULT_OPERATION_TIMEOUT;
use std::time::Duration;

/// Default lifetime of an active session record (2 hours)
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// Default grace period between closing a session and its expiry
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(30);

/// Store configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Expiry renewed on every write while the session is active
    pub session_ttl: Duration,

    /// Grace period applied when a session is closed
    pub close_grace: Duration,

    /// Lobby code candidates tried before giving up
    pub max_code_attempts: usize,

    /// Compare-and-swap attempts per mutation before reporting contention
    pub max_write_attempts: usize,

    /// Upper bound on any single backend call
    pub operation_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            session_ttl: DEFAULT_SESSION_TTL,
            close_grace: DEFAULT_CLOSE_GRACE,
            max_code_attempts: 256,
            max_write_attempts: 16,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

impl StoreConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.session_ttl.is_zero() {
            return Err("Session TTL must be greater than zero".to_string());
        }

        if self.close_grace.is_zero() {
            return Err("Close grace must be greater than zero".to_string());
        }

        if self.close_grace > self.session_ttl {
            return Err("Close grace cannot exceed the session TTL".to_string());
        }

        if self.max_code_attempts == 0 || self.max_write_attempts == 0 {
            return Err("Attempt limits must be at least 1".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = StoreConfig::default();
        assert_eq!(config.session_ttl.as_secs(), 7200);
        assert_eq!(config.operation_timeout.as_secs(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_grace_longer_than_ttl_rejected() {
        let config = StoreConfig {
            session_ttl: Duration::from_secs(10),
            close_grace: Duration::from_secs(60),
            ..StoreConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
