//! Lobby codes and the storage keys derived from them.

use rand::seq::IndexedRandom;

const ADJECTIVES: &[&str] = &[
    "brave", "happy", "rapid", "silent", "mighty", "tipsy", "rowdy", "neon", "funky", "groovy",
    "jolly", "lively", "epic", "cosmic", "sunny", "fizzy", "giddy", "lucky", "dizzy", "golden",
];

const ANIMALS: &[&str] = &[
    "otter", "panda", "falcon", "tiger", "rabbit", "wolf", "llama", "gecko", "koala", "badger",
    "raven", "shark", "fox", "penguin", "lemur", "moose", "beaver", "lynx", "orca", "walrus",
];

const VERBS: &[&str] = &[
    "jumps", "dances", "drifts", "spins", "glows", "drinks", "cheers", "toasts", "bounces",
    "slides", "chants", "laughs", "mingles", "shuffles", "sings", "howls", "waltzes", "wobbles",
];

/// Source of candidate lobby codes. Candidates may collide; the store
/// retries until it finds a free one.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// `ADJECTIVE-ANIMAL-VERB` codes drawn with the thread-local CSPRNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct WordCodeGenerator;

impl CodeGenerator for WordCodeGenerator {
    fn generate(&self) -> String {
        let mut rng = rand::rng();
        let words: Vec<&str> = [ADJECTIVES, ANIMALS, VERBS]
            .iter()
            .filter_map(|list| list.choose(&mut rng).copied())
            .collect();
        words.join("-").to_uppercase()
    }
}

/// Canonical form of a user-supplied code.
#[must_use]
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Persistence key for a lobby.
#[must_use]
pub fn session_key(code: &str) -> String {
    format!("session:{}", normalize_code(code))
}

/// Fan-out topic for a lobby.
#[must_use]
pub fn lobby_channel(code: &str) -> String {
    format!("lobby:{}", normalize_code(code))
}

/// Prefix shared by every fan-out topic
pub const LOBBY_CHANNEL_PREFIX: &str = "lobby:";
