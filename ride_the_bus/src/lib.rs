//! # Ride the Bus
//!
//! Backend for the Ride the Bus drinking game: four guessing rounds over
//! shared cards, with doubling stakes and a closing phase where winners hand
//! out the drinks they earned.
//!
//! ## Architecture
//!
//! Lobbies are stored as whole serialized sessions so any replica can serve
//! any request:
//!
//! - **Engine**: pure transitions over a session value, no I/O
//! - **Store**: load, apply one transition, compare-and-swap, with expiry
//! - **Fan-out**: Redis pub/sub carries every new snapshot to all replicas
//! - **Hub**: per-replica rooms of WebSocket connections with idle close
//! - **Scheduler**: round and distribution timers guarded against staleness
//!
//! ## Core Modules
//!
//! - [`game`]: Cards, rules and state transitions
//! - [`session`]: Session persistence and lobby codes
//! - [`realtime`]: Connection hub and cross-replica fan-out
//! - [`service`]: The operations exposed to the HTTP layer
//!
//! ## Example
//!
//! ```
//! use ride_the_bus::game::{GameConfig, Player, Session, start_game};
//!
//! let host = Player::new("host_1".to_string(), "Host".to_string());
//! let mut session = Session::new("BRAVE-OTTER-JUMPS".to_string(), host, chrono::Utc::now());
//! session.players.push(Player::new("player_1".to_string(), "Kim".to_string()));
//!
//! start_game(&mut session, &GameConfig::default(), chrono::Utc::now(), &mut rand::rng()).unwrap();
//! assert_eq!(session.game.active_players, vec!["player_1"]);
//! ```

/// Cards, rules and state transitions.
pub mod game;
pub use game::{ErrorKind, GameConfig, GameError, Player, PlayerId, Session};

/// Realtime delivery of session snapshots.
pub mod realtime;

/// Deferred round and distribution timers.
pub mod scheduler;

/// The operations exposed to the HTTP layer.
pub mod service;
pub use service::LobbyService;

/// Session persistence and lobby codes.
pub mod session;
pub use session::{SessionStore, StoreConfig, StoreError};
