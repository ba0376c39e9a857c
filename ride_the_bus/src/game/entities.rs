use chrono::{DateTime, Utc};
use rand::{CryptoRng, Rng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    fmt,
};

/// Opaque, unique player identity (`host_<uuid>` or `player_<uuid>`).
pub type PlayerId = String;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Suit {
    Hearts,
    Diamonds,
    Clubs,
    Spades,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Hearts, Suit::Diamonds, Suit::Clubs, Suit::Spades];

    #[must_use]
    pub fn is_red(self) -> bool {
        matches!(self, Suit::Hearts | Suit::Diamonds)
    }
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Hearts => "♥",
            Self::Diamonds => "♦",
            Self::Clubs => "♣",
            Self::Spades => "♠",
        };
        write!(f, "{repr}")
    }
}

/// Lowest card rank (deuce)
pub const MIN_RANK: u8 = 2;

/// Highest card rank (ace is high)
pub const MAX_RANK: u8 = 14;

/// A drawn card. Rank runs 2..=14 with the ace high.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Card {
    pub rank: u8,
    pub suit: Suit,
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let rank = match self.rank {
            14 => "A",
            11 => "J",
            12 => "Q",
            13 => "K",
            v => &v.to_string(),
        };
        write!(f, "{rank}{}", self.suit)
    }
}

/// Standard 52-card deck.
#[derive(Debug)]
pub struct Deck {
    cards: Vec<Card>,
}

impl Default for Deck {
    fn default() -> Self {
        let cards = Suit::ALL
            .iter()
            .flat_map(|&suit| (MIN_RANK..=MAX_RANK).map(move |rank| Card { rank, suit }))
            .collect();
        Self { cards }
    }
}

impl Deck {
    #[must_use]
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Fisher-Yates shuffle driven by a cryptographically secure source.
    pub fn shuffle<R: Rng + CryptoRng>(&mut self, rng: &mut R) {
        self.cards.shuffle(rng);
    }

    /// Draw the four shared cards for a game from a freshly shuffled deck.
    pub fn draw_shared<R: Rng + CryptoRng>(rng: &mut R) -> [Card; 4] {
        let mut deck = Deck::default();
        deck.shuffle(rng);
        [deck.cards[0], deck.cards[1], deck.cards[2], deck.cards[3]]
    }
}

/// The closed guess vocabulary across all four rounds.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Guess {
    Red,
    Black,
    Higher,
    Lower,
    Between,
    Outside,
    Hearts,
    Diamonds,
    Clubs,
    Spades,
}

impl Guess {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Guess::Red => "red",
            Guess::Black => "black",
            Guess::Higher => "higher",
            Guess::Lower => "lower",
            Guess::Between => "between",
            Guess::Outside => "outside",
            Guess::Hearts => "hearts",
            Guess::Diamonds => "diamonds",
            Guess::Clubs => "clubs",
            Guess::Spades => "spades",
        }
    }

    /// The suit named by a round-3 guess.
    #[must_use]
    pub fn suit(self) -> Option<Suit> {
        match self {
            Guess::Hearts => Some(Suit::Hearts),
            Guess::Diamonds => Some(Suit::Diamonds),
            Guess::Clubs => Some(Suit::Clubs),
            Guess::Spades => Some(Suit::Spades),
            _ => None,
        }
    }
}

impl fmt::Display for Guess {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Total units charged to this player across games
    #[serde(default)]
    pub score: u32,
    #[serde(default)]
    pub lifetime_drank: u32,
    #[serde(default)]
    pub given_out: u32,
}

impl Player {
    #[must_use]
    pub fn new(id: PlayerId, name: String) -> Self {
        Self {
            id,
            name,
            score: 0,
            lifetime_drank: 0,
            given_out: 0,
        }
    }

    pub(crate) fn charge(&mut self, units: u32) {
        self.score = self.score.saturating_add(units);
        self.lifetime_drank = self.lifetime_drank.saturating_add(units);
    }
}

/// Per-game state embedded in a session.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameState {
    pub started: bool,
    /// 0..=3 while guessing, 4 once the game is over
    pub round: u8,
    pub shared: Option<[Card; 4]>,
    /// Guess history per player, indexed by round. `None` marks a skipped round.
    pub guesses: HashMap<PlayerId, Vec<Option<Guess>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    pub active_players: Vec<PlayerId>,
    pub distribution_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution_deadline: Option<DateTime<Utc>>,
    pub drink_now_by_player: HashMap<PlayerId, u32>,
    pub give_out_remaining_by_player: HashMap<PlayerId, u32>,
    pub pending_tap_out_by_player: HashSet<PlayerId>,
}

impl GameState {
    #[must_use]
    pub fn is_active(&self, player_id: &str) -> bool {
        self.active_players.iter().any(|p| p == player_id)
    }

    /// The guess a player recorded for `round`, if any.
    #[must_use]
    pub fn guess_for(&self, player_id: &str, round: u8) -> Option<Guess> {
        self.guesses
            .get(player_id)
            .and_then(|g| g.get(usize::from(round)).copied().flatten())
    }

    #[must_use]
    pub fn give_out_remaining(&self, player_id: &str) -> u32 {
        self.give_out_remaining_by_player
            .get(player_id)
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Active,
    Closing,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Closing => write!(f, "closing"),
        }
    }
}

/// One lobby: its players in join order (host first) plus the running game.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub host_id: PlayerId,
    pub code: String,
    pub players: Vec<Player>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub game: GameState,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shutting_down_at: Option<DateTime<Utc>>,
    /// Bumped on every stored write; orders snapshots of one lobby
    #[serde(default)]
    pub version: u64,
}

impl Session {
    /// A fresh lobby containing only its host.
    #[must_use]
    pub fn new(code: String, host: Player, created_at: DateTime<Utc>) -> Self {
        Self {
            host_id: host.id.clone(),
            code,
            players: vec![host],
            created_at,
            game: GameState::default(),
            status: SessionStatus::Active,
            shutting_down_at: None,
            version: 0,
        }
    }

    #[must_use]
    pub fn has_player(&self, player_id: &str) -> bool {
        self.players.iter().any(|p| p.id == player_id)
    }

    #[must_use]
    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub(crate) fn player_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == player_id)
    }

    /// First player whose display name matches exactly.
    #[must_use]
    pub fn player_by_name(&self, name: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.status == SessionStatus::Closing
    }
}
