//! Persistence backends for serialized session records.
//!
//! A backend only stores opaque payloads with an expiry. Atomicity comes
//! from [`SessionBackend::compare_and_swap`]: a write lands only if the
//! record still holds exactly the payload the writer loaded.

use super::errors::BackendError;
use async_trait::async_trait;
use std::{collections::HashMap, future::Future, time::Duration};
use tokio::{sync::Mutex, time::Instant};

/// Default timeout for a single backend call (5 seconds)
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Key/value storage with per-record expiry and compare-and-swap.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Fetch the live payload under `key`, if any.
    async fn load(&self, key: &str) -> Result<Option<String>, BackendError>;

    /// Store `payload` only if `key` holds no live record.
    ///
    /// Returns `false` when the key was already taken.
    async fn insert_if_absent(
        &self,
        key: &str,
        payload: &str,
        ttl: Duration,
    ) -> Result<bool, BackendError>;

    /// Replace the record under `key` only if it still equals `expected`.
    ///
    /// Returns `false` when another writer got there first or the record
    /// expired.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        payload: &str,
        ttl: Duration,
    ) -> Result<bool, BackendError>;
}

/// Execute a backend call with timeout
///
/// # Arguments
///
/// * `duration` - Timeout duration
/// * `future` - Backend operation to execute
///
/// # Returns
///
/// * `Result<T, BackendError>` - Result or [`BackendError::Timeout`]
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout(duration)),
    }
}

#[derive(Debug)]
struct Entry {
    payload: String,
    expires_at: Instant,
}

/// Single-process backend for tests and single-replica deployments.
///
/// Expiry follows the tokio clock, so paused-time tests can fast-forward it.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries.values().filter(|e| e.expires_at > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Time left before `key` expires
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.expires_at - now)
    }
}

fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str, now: Instant) -> Option<&'a Entry> {
    if entries.get(key).is_some_and(|e| e.expires_at <= now) {
        entries.remove(key);
    }
    entries.get(key)
}

#[async_trait]
impl SessionBackend for MemoryBackend {
    async fn load(&self, key: &str) -> Result<Option<String>, BackendError> {
        let mut entries = self.entries.lock().await;
        Ok(live(&mut entries, key, Instant::now()).map(|e| e.payload.clone()))
    }

    async fn insert_if_absent(
        &self,
        key: &str,
        payload: &str,
        ttl: Duration,
    ) -> Result<bool, BackendError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if live(&mut entries, key, now).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                payload: payload.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        payload: &str,
        ttl: Duration,
    ) -> Result<bool, BackendError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if !live(&mut entries, key, now).is_some_and(|e| e.payload == expected) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                payload: payload.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }
}
