//! Ride the Bus game engine.
//!
//! This module provides the rules and state transitions for one lobby:
//! - Card and deck entities with a cryptographically strong shuffle
//! - The fixed four-round guess vocabulary and correctness rules
//! - Pure transitions over a [`Session`] (start, guess, tap-out, advance,
//!   distribute, finalize)
//!
//! Nothing in here performs I/O. Callers supply the clock and the random
//! source, so every transition is reproducible under test.

pub mod config;
pub mod engine;
pub mod entities;
pub mod errors;
pub mod rules;

pub use config::GameConfig;
pub use engine::{
    DistributionOutcome, RoundOutcome, advance_round, all_distributed, all_guessed,
    distribute_drinks, finalize_distribution, start_game, submit_guess, tap_out,
};
pub use entities::{Card, GameState, Guess, Player, PlayerId, Session, SessionStatus, Suit};
pub use errors::{ErrorKind, GameError, GameResult};
