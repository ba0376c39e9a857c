//! Game timing configuration.

use std::time::Duration;

/// Default time players have to answer each round
pub const DEFAULT_ROUND_DURATION: Duration = Duration::from_secs(15);

/// Default length of the drink distribution window
pub const DEFAULT_DISTRIBUTION_DURATION: Duration = Duration::from_secs(20);

/// Number of guessing rounds in a game
pub const ROUND_COUNT: u8 = 4;

/// Round timings used when computing deadlines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameConfig {
    /// Time allowed for each guessing round
    pub round_duration: Duration,

    /// Time allowed for manual drink distribution after the last round
    pub distribution_duration: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            round_duration: DEFAULT_ROUND_DURATION,
            distribution_duration: DEFAULT_DISTRIBUTION_DURATION,
        }
    }
}

impl GameConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.round_duration.is_zero() {
            return Err("Round duration must be greater than zero".to_string());
        }

        if self.distribution_duration.is_zero() {
            return Err("Distribution duration must be greater than zero".to_string());
        }

        Ok(())
    }

    pub(crate) fn round_delta(&self) -> chrono::TimeDelta {
        to_delta(self.round_duration)
    }

    pub(crate) fn distribution_delta(&self) -> chrono::TimeDelta {
        to_delta(self.distribution_duration)
    }
}

fn to_delta(duration: Duration) -> chrono::TimeDelta {
    chrono::TimeDelta::from_std(duration).unwrap_or(chrono::TimeDelta::MAX)
}
