//! Round vocabulary, stakes and correctness rules.
//!
//! | round | vocabulary          | stake | compares                      |
//! |-------|---------------------|-------|-------------------------------|
//! | 0     | red, black          | 2     | colour of card 0              |
//! | 1     | higher, lower       | 4     | rank of card 1 vs card 0      |
//! | 2     | between, outside    | 8     | rank of card 2 vs {0, 1}      |
//! | 3     | any suit            | 16    | suit of card 3                |

use super::entities::{Card, Guess};

/// Trim and lower-case raw guess text; `inside` is an alias of `between`.
#[must_use]
pub fn normalize_guess(raw: &str) -> String {
    let guess = raw.trim().to_lowercase();
    if guess == "inside" {
        "between".to_string()
    } else {
        guess
    }
}

/// Whether an already-normalized guess belongs to the round's vocabulary.
#[must_use]
pub fn valid_guess_for_round(round: u8, guess: &str) -> bool {
    parse_normalized(round, guess).is_some()
}

/// Normalize and validate raw guess text for a round.
#[must_use]
pub fn parse_guess(round: u8, raw: &str) -> Option<Guess> {
    parse_normalized(round, &normalize_guess(raw))
}

fn parse_normalized(round: u8, guess: &str) -> Option<Guess> {
    match (round, guess) {
        (0, "red") => Some(Guess::Red),
        (0, "black") => Some(Guess::Black),
        (1, "higher") => Some(Guess::Higher),
        (1, "lower") => Some(Guess::Lower),
        (2, "between") => Some(Guess::Between),
        (2, "outside") => Some(Guess::Outside),
        (3, "hearts") => Some(Guess::Hearts),
        (3, "diamonds") => Some(Guess::Diamonds),
        (3, "clubs") => Some(Guess::Clubs),
        (3, "spades") => Some(Guess::Spades),
        _ => None,
    }
}

/// Drink units at risk in a round. Zero outside 0..=3.
#[must_use]
pub fn stake_for_round(round: u8) -> u32 {
    match round {
        0 => 2,
        1 => 4,
        2 => 8,
        3 => 16,
        _ => 0,
    }
}

/// Whether `guess` wins `round` against the shared cards.
#[must_use]
pub fn is_correct_guess(shared: &[Card; 4], round: u8, guess: Guess) -> bool {
    match round {
        0 => {
            let red = shared[0].suit.is_red();
            (guess == Guess::Red && red) || (guess == Guess::Black && !red)
        }
        1 => {
            let (first, second) = (shared[0].rank, shared[1].rank);
            (guess == Guess::Higher && second > first) || (guess == Guess::Lower && second < first)
        }
        2 => {
            let low = shared[0].rank.min(shared[1].rank);
            let high = shared[0].rank.max(shared[1].rank);
            let drawn = shared[2].rank;
            let between = drawn > low && drawn < high;
            let outside = drawn < low || drawn > high;
            (guess == Guess::Between && between) || (guess == Guess::Outside && outside)
        }
        3 => guess.suit() == Some(shared[3].suit),
        _ => false,
    }
}
