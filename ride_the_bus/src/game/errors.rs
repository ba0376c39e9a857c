//! Game engine error types.

use thiserror::Error;

/// Broad failure classes shared by every layer of the lobby stack.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Malformed, missing or duplicate input
    Validation,
    /// Operation not valid in the current phase
    State,
    /// Store, bus or generator unavailable
    Resource,
    /// Stale write or lost race
    Concurrency,
}

/// Rejections raised by the engine. A rejected transition never leaves the
/// session partially mutated.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum GameError {
    #[error("game already started")]
    AlreadyStarted,
    #[error("game not started")]
    NotStarted,
    #[error("invalid round {0}")]
    InvalidRound(u8),
    #[error("game already finished")]
    AlreadyFinished,
    #[error("player not in session")]
    UnknownPlayer,
    #[error("invalid guess {guess:?} for round {round}")]
    InvalidGuess { round: u8, guess: String },
    #[error("guess already submitted for this round")]
    GuessAlreadySubmitted,
    #[error("player already tapped out")]
    PlayerNotActive,
    #[error("tap out already requested")]
    TapOutAlreadyRequested,
    #[error("distribution not active")]
    DistributionNotActive,
    #[error("player required")]
    PlayerRequired,
    #[error("no drinks left to give")]
    NoDrinksLeft,
    #[error("cannot give drinks to yourself")]
    CannotGiveToSelf,
    #[error("invalid target player")]
    InvalidTarget,
    #[error("no allocation provided")]
    EmptyAllocation,
    #[error("allocated {allocated} but only {remaining} left to give")]
    OverAllocated { allocated: u64, remaining: u32 },
}

impl GameError {
    /// Classify the rejection
    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::AlreadyStarted
            | GameError::NotStarted
            | GameError::InvalidRound(_)
            | GameError::AlreadyFinished
            | GameError::PlayerNotActive
            | GameError::DistributionNotActive => ErrorKind::State,
            _ => ErrorKind::Validation,
        }
    }
}

/// Result type for engine transitions
pub type GameResult<T> = Result<T, GameError>;
