//! Realtime delivery of session snapshots.
//!
//! Each replica keeps its own [`ConnectionHub`]; the [`FanoutBus`] carries
//! every mutation to all replicas so players connected anywhere see it.

pub mod bus;
pub mod config;
pub mod hub;
pub mod messages;

pub use bus::{BusError, FanoutBus, RedisBus};
pub use config::HubConfig;
pub use hub::{ConnectionHub, ConnectionId};
pub use messages::PushMessage;
