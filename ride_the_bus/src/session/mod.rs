//! Lobby session persistence.
//!
//! This module implements:
//! - Pluggable record storage behind [`SessionBackend`] (Redis or in-memory)
//! - Optimistic compare-and-swap writes so concurrent requests to one lobby
//!   behave as if serialized
//! - Expiry renewed on every write, shortened to a grace period on close
//! - Collision-checked `ADJECTIVE-ANIMAL-VERB` lobby codes

pub mod backend;
pub mod codes;
pub mod config;
pub mod errors;
pub mod redis;
pub mod store;

pub use backend::{MemoryBackend, SessionBackend};
pub use codes::{CodeGenerator, WordCodeGenerator, lobby_channel, normalize_code, session_key};
pub use config::StoreConfig;
pub use errors::{BackendError, StoreError, StoreResult};
pub use self::redis::RedisBackend;
pub use store::SessionStore;
