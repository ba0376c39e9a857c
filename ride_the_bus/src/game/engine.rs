//! State transitions over a lobby session.
//!
//! Every function here validates its whole input before touching the
//! session, so an `Err` always leaves the session exactly as it was.

use super::{
    config::{GameConfig, ROUND_COUNT},
    entities::{Deck, GameState, Guess, PlayerId, Session},
    errors::{GameError, GameResult},
    rules::{is_correct_guess, parse_guess, stake_for_round},
};
use chrono::{DateTime, TimeDelta, Utc};
use rand::{CryptoRng, Rng};
use std::collections::{HashMap, HashSet};

const LAST_ROUND: u8 = ROUND_COUNT - 1;

/// What a successful round resolution led to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RoundOutcome {
    /// Guessing continues with `round`
    NextRound { round: u8, deadline: DateTime<Utc> },
    /// All four rounds are done and distribution is open
    Distribution { deadline: DateTime<Utc> },
}

/// Result of a manual drink allocation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DistributionOutcome {
    /// Units handed out by this call
    pub given: u32,
    /// Whether the call closed the distribution phase
    pub finalized: bool,
}

fn deadline_after(now: DateTime<Utc>, delta: TimeDelta) -> DateTime<Utc> {
    now.checked_add_signed(delta)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Deal a new game: four shared cards, round 0, every non-host player active.
pub fn start_game<R: Rng + CryptoRng>(
    session: &mut Session,
    config: &GameConfig,
    now: DateTime<Utc>,
    rng: &mut R,
) -> GameResult<()> {
    if session.game.started {
        return Err(GameError::AlreadyStarted);
    }

    let active_players = session
        .players
        .iter()
        .filter(|p| p.id != session.host_id)
        .map(|p| p.id.clone())
        .collect();

    session.game = GameState {
        started: true,
        round: 0,
        shared: Some(Deck::draw_shared(rng)),
        deadline: Some(deadline_after(now, config.round_delta())),
        active_players,
        ..GameState::default()
    };
    Ok(())
}

/// Record a player's guess for the current round.
pub fn submit_guess(session: &mut Session, player_id: &str, raw_guess: &str) -> GameResult<Guess> {
    let game = &session.game;
    if !game.started {
        return Err(GameError::NotStarted);
    }
    if game.round > LAST_ROUND {
        return Err(GameError::InvalidRound(game.round));
    }
    if !session.has_player(player_id) {
        return Err(GameError::UnknownPlayer);
    }

    let round = game.round;
    let guess = parse_guess(round, raw_guess).ok_or_else(|| GameError::InvalidGuess {
        round,
        guess: raw_guess.trim().to_string(),
    })?;

    let index = usize::from(round);
    if game.guesses.get(player_id).is_some_and(|g| g.len() > index) {
        return Err(GameError::GuessAlreadySubmitted);
    }

    let history = session
        .game
        .guesses
        .entry(player_id.to_string())
        .or_default();
    history.resize(index, None);
    history.push(Some(guess));
    Ok(guess)
}

/// Ask to leave the game at the end of the current round.
pub fn tap_out(session: &mut Session, player_id: &str) -> GameResult<()> {
    if !session.game.started {
        return Err(GameError::NotStarted);
    }
    if !session.has_player(player_id) {
        return Err(GameError::UnknownPlayer);
    }
    if !session.game.is_active(player_id) {
        return Err(GameError::PlayerNotActive);
    }
    if session.game.pending_tap_out_by_player.contains(player_id) {
        return Err(GameError::TapOutAlreadyRequested);
    }

    session
        .game
        .pending_tap_out_by_player
        .insert(player_id.to_string());
    Ok(())
}

/// Resolve the current round and move on.
///
/// Correct guessers earn the stake as give-out credit; everyone else active
/// drinks it now. Only correct players without a pending tap-out stay active.
pub fn advance_round(
    session: &mut Session,
    config: &GameConfig,
    now: DateTime<Utc>,
) -> GameResult<RoundOutcome> {
    if !session.game.started {
        return Err(GameError::NotStarted);
    }
    if session.game.round > LAST_ROUND {
        return Err(GameError::AlreadyFinished);
    }

    let round = session.game.round;
    let stake = stake_for_round(round);
    let Some(shared) = session.game.shared else {
        return Err(GameError::NotStarted);
    };

    let active: HashSet<PlayerId> = session.game.active_players.iter().cloned().collect();
    let mut correct: HashSet<PlayerId> = HashSet::new();

    let Session { players, game, .. } = session;
    for player in players.iter_mut().filter(|p| active.contains(&p.id)) {
        let won = game
            .guess_for(&player.id, round)
            .is_some_and(|guess| is_correct_guess(&shared, round, guess));

        if won {
            *game
                .give_out_remaining_by_player
                .entry(player.id.clone())
                .or_default() += stake;
            correct.insert(player.id.clone());
        } else {
            *game
                .drink_now_by_player
                .entry(player.id.clone())
                .or_default() += stake;
            player.charge(stake);
        }
    }

    let pending = std::mem::take(&mut game.pending_tap_out_by_player);
    game.active_players
        .retain(|id| correct.contains(id) && !pending.contains(id));

    game.round += 1;
    if game.round > LAST_ROUND {
        let deadline = deadline_after(now, config.distribution_delta());
        game.started = false;
        game.deadline = None;
        game.distribution_active = true;
        game.distribution_deadline = Some(deadline);
        return Ok(RoundOutcome::Distribution { deadline });
    }

    let deadline = deadline_after(now, config.round_delta());
    game.deadline = Some(deadline);
    Ok(RoundOutcome::NextRound {
        round: game.round,
        deadline,
    })
}

/// Hand out part of a player's give-out credit to other active players.
///
/// Non-positive entries are ignored. When every active player has spent
/// their credit the phase is finalized on the spot.
pub fn distribute_drinks<R: Rng + CryptoRng>(
    session: &mut Session,
    from_player_id: &str,
    allocations: &HashMap<PlayerId, i64>,
    rng: &mut R,
) -> GameResult<DistributionOutcome> {
    if !session.game.distribution_active {
        return Err(GameError::DistributionNotActive);
    }
    if from_player_id.is_empty() {
        return Err(GameError::PlayerRequired);
    }

    let remaining = session.game.give_out_remaining(from_player_id);
    if remaining == 0 {
        return Err(GameError::NoDrinksLeft);
    }

    let mut used: u64 = 0;
    let mut grants: Vec<(&PlayerId, u32)> = Vec::with_capacity(allocations.len());
    for (target, &amount) in allocations {
        if amount <= 0 {
            continue;
        }
        if target == from_player_id {
            return Err(GameError::CannotGiveToSelf);
        }
        if !session.game.is_active(target) {
            return Err(GameError::InvalidTarget);
        }
        // i64 -> u64 is lossless for positive values
        used = used.saturating_add(amount as u64);
        grants.push((target, u32::try_from(amount).unwrap_or(u32::MAX)));
    }
    if used == 0 {
        return Err(GameError::EmptyAllocation);
    }
    if used > u64::from(remaining) {
        return Err(GameError::OverAllocated {
            allocated: used,
            remaining,
        });
    }
    // bounded by `remaining` above
    let used = used as u32;

    for (target, amount) in grants {
        *session
            .game
            .drink_now_by_player
            .entry(target.clone())
            .or_default() += amount;
        if let Some(player) = session.player_mut(target) {
            player.charge(amount);
        }
    }

    if let Some(left) = session
        .game
        .give_out_remaining_by_player
        .get_mut(from_player_id)
    {
        *left -= used;
    }
    if let Some(giver) = session.player_mut(from_player_id) {
        giver.given_out = giver.given_out.saturating_add(used);
    }

    let finalized = all_distributed(session);
    if finalized {
        finalize_distribution(session, rng);
    }

    Ok(DistributionOutcome {
        given: used,
        finalized,
    })
}

/// Close the distribution phase, assigning any unspent credit one unit at a
/// time to a uniformly random other active player.
///
/// A no-op returning 0 when distribution is not active. Returns the number
/// of units assigned at random.
pub fn finalize_distribution<R: Rng + CryptoRng>(session: &mut Session, rng: &mut R) -> u32 {
    if !session.game.distribution_active {
        return 0;
    }

    // join order first, then any leftover ids, so seeded runs repeat exactly
    let mut givers: Vec<PlayerId> = session
        .players
        .iter()
        .map(|p| p.id.clone())
        .filter(|id| session.game.give_out_remaining(id) > 0)
        .collect();
    let mut orphans: Vec<PlayerId> = session
        .game
        .give_out_remaining_by_player
        .iter()
        .filter(|(id, left)| **left > 0 && !session.has_player(id))
        .map(|(id, _)| id.clone())
        .collect();
    orphans.sort();
    givers.extend(orphans);

    let targets = session.game.active_players.clone();
    let mut assigned = 0;

    for giver in givers {
        let pool: Vec<&PlayerId> = targets.iter().filter(|t| **t != giver).collect();
        if pool.is_empty() {
            continue;
        }

        let mut left = session.game.give_out_remaining(&giver);
        let mut given = 0;
        while left > 0 {
            let target = pool[rng.random_range(0..pool.len())];
            *session
                .game
                .drink_now_by_player
                .entry(target.clone())
                .or_default() += 1;
            if let Some(player) = session.player_mut(target) {
                player.charge(1);
            }
            left -= 1;
            given += 1;
        }

        session
            .game
            .give_out_remaining_by_player
            .insert(giver.clone(), 0);
        if let Some(player) = session.player_mut(&giver) {
            player.given_out = player.given_out.saturating_add(given);
        }
        assigned += given;
    }

    session.game.distribution_active = false;
    session.game.distribution_deadline = None;
    session.game.deadline = None;
    assigned
}

/// Whether every active player has spent their give-out credit.
#[must_use]
pub fn all_distributed(session: &Session) -> bool {
    session
        .game
        .active_players
        .iter()
        .all(|id| session.game.give_out_remaining(id) == 0)
}

/// Whether every active player has answered the current round.
#[must_use]
pub fn all_guessed(session: &Session) -> bool {
    let game = &session.game;
    game.started
        && !game.active_players.is_empty()
        && game
            .active_players
            .iter()
            .all(|id| game.guess_for(id, game.round).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::{Card, Player, Suit};
    use rand::{SeedableRng, rngs::StdRng};

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T20:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn lobby(names: &[&str]) -> Session {
        let host = Player::new("host".to_string(), "Host".to_string());
        let mut session = Session::new("TEST-LOBBY-CODE".to_string(), host, now());
        for name in names {
            session
                .players
                .push(Player::new(name.to_string(), name.to_string()));
        }
        session
    }

    fn started(names: &[&str], shared: [Card; 4]) -> Session {
        let mut session = lobby(names);
        start_game(&mut session, &GameConfig::default(), now(), &mut rng()).unwrap();
        session.game.shared = Some(shared);
        session
    }

    fn cards(ranks: [u8; 4], suits: [Suit; 4]) -> [Card; 4] {
        [
            Card { rank: ranks[0], suit: suits[0] },
            Card { rank: ranks[1], suit: suits[1] },
            Card { rank: ranks[2], suit: suits[2] },
            Card { rank: ranks[3], suit: suits[3] },
        ]
    }

    /// 5♥ 9♣ 7♠ 2♦
    fn red_low_between_diamond() -> [Card; 4] {
        cards(
            [5, 9, 7, 2],
            [Suit::Hearts, Suit::Clubs, Suit::Spades, Suit::Diamonds],
        )
    }

    fn distributing(credit: &[(&str, u32)], active: &[&str]) -> Session {
        let names: Vec<&str> = credit.iter().map(|(n, _)| *n).collect();
        let mut session = lobby(&names);
        session.game.distribution_active = true;
        session.game.distribution_deadline = Some(now());
        session.game.active_players = active.iter().map(|s| s.to_string()).collect();
        for (id, left) in credit {
            session
                .game
                .give_out_remaining_by_player
                .insert(id.to_string(), *left);
        }
        session
    }

    #[test]
    fn test_start_game_excludes_host() {
        let mut session = lobby(&["a", "b"]);
        start_game(&mut session, &GameConfig::default(), now(), &mut rng()).unwrap();

        assert!(session.game.started);
        assert_eq!(session.game.round, 0);
        assert_eq!(session.game.active_players, vec!["a", "b"]);
        assert_eq!(
            session.game.deadline,
            Some(now() + TimeDelta::seconds(15))
        );
        assert!(session.game.shared.is_some());
    }

    #[test]
    fn test_start_game_twice_fails_without_change() {
        let mut session = lobby(&["a"]);
        start_game(&mut session, &GameConfig::default(), now(), &mut rng()).unwrap();
        let before = session.clone();

        let err = start_game(&mut session, &GameConfig::default(), now(), &mut rng());
        assert_eq!(err, Err(GameError::AlreadyStarted));
        assert_eq!(session, before);
    }

    #[test]
    fn test_submit_guess_validation() {
        let mut session = lobby(&["a"]);
        assert_eq!(
            submit_guess(&mut session, "a", "red"),
            Err(GameError::NotStarted)
        );

        let mut session = started(&["a"], red_low_between_diamond());
        assert_eq!(
            submit_guess(&mut session, "ghost", "red"),
            Err(GameError::UnknownPlayer)
        );
        assert!(matches!(
            submit_guess(&mut session, "a", "higher"),
            Err(GameError::InvalidGuess { round: 0, .. })
        ));
        assert_eq!(submit_guess(&mut session, "a", " RED "), Ok(Guess::Red));
        assert_eq!(
            submit_guess(&mut session, "a", "black"),
            Err(GameError::GuessAlreadySubmitted)
        );
    }

    #[test]
    fn test_submit_guess_backfills_skipped_rounds() {
        let mut session = started(&["a"], red_low_between_diamond());
        session.game.round = 2;
        submit_guess(&mut session, "a", "inside").unwrap();

        assert_eq!(
            session.game.guesses["a"],
            vec![None, None, Some(Guess::Between)]
        );
    }

    #[test]
    fn test_missing_guess_counts_as_wrong() {
        let mut session = started(&["a", "b"], red_low_between_diamond());
        submit_guess(&mut session, "a", "red").unwrap();

        advance_round(&mut session, &GameConfig::default(), now()).unwrap();

        assert_eq!(session.game.active_players, vec!["a"]);
        assert_eq!(session.game.drink_now_by_player["b"], 2);
        assert_eq!(session.game.give_out_remaining("a"), 2);
        assert_eq!(session.player("b").unwrap().lifetime_drank, 2);
        assert_eq!(session.player("b").unwrap().score, 2);
    }

    #[test]
    fn test_tap_out_keeps_payout_but_removes_player() {
        let mut session = started(&["a", "b"], red_low_between_diamond());
        submit_guess(&mut session, "a", "red").unwrap();
        submit_guess(&mut session, "b", "red").unwrap();
        tap_out(&mut session, "a").unwrap();
        assert_eq!(
            tap_out(&mut session, "a"),
            Err(GameError::TapOutAlreadyRequested)
        );

        advance_round(&mut session, &GameConfig::default(), now()).unwrap();

        assert_eq!(session.game.give_out_remaining("a"), 2);
        assert_eq!(session.game.active_players, vec!["b"]);
        assert!(session.game.pending_tap_out_by_player.is_empty());
        assert_eq!(tap_out(&mut session, "a"), Err(GameError::PlayerNotActive));
    }

    #[test]
    fn test_round_two_bound_equal_is_wrong_for_both() {
        let shared = cards([5, 9, 9, 2], [Suit::Hearts; 4]);
        let mut session = started(&["a", "b"], shared);
        session.game.round = 2;
        submit_guess(&mut session, "a", "between").unwrap();
        submit_guess(&mut session, "b", "outside").unwrap();

        advance_round(&mut session, &GameConfig::default(), now()).unwrap();

        assert!(session.game.active_players.is_empty());
        assert_eq!(session.game.drink_now_by_player["a"], 8);
        assert_eq!(session.game.drink_now_by_player["b"], 8);
    }

    #[test]
    fn test_last_round_opens_distribution() {
        let mut session = started(&["a"], red_low_between_diamond());
        session.game.round = 3;
        submit_guess(&mut session, "a", "diamonds").unwrap();

        let outcome = advance_round(&mut session, &GameConfig::default(), now()).unwrap();

        let deadline = now() + TimeDelta::seconds(20);
        assert_eq!(outcome, RoundOutcome::Distribution { deadline });
        assert!(!session.game.started);
        assert!(session.game.distribution_active);
        assert_eq!(session.game.deadline, None);
        assert_eq!(session.game.distribution_deadline, Some(deadline));
        assert_eq!(session.game.round, 4);
        assert_eq!(session.game.give_out_remaining("a"), 16);
        assert_eq!(
            advance_round(&mut session, &GameConfig::default(), now()),
            Err(GameError::NotStarted)
        );
    }

    #[test]
    fn test_full_game_accumulates_credit() {
        let mut session = started(&["a"], red_low_between_diamond());
        for guess in ["red", "higher", "between", "diamonds"] {
            submit_guess(&mut session, "a", guess).unwrap();
            advance_round(&mut session, &GameConfig::default(), now()).unwrap();
        }
        assert_eq!(session.game.give_out_remaining("a"), 2 + 4 + 8 + 16);
        assert!(session.game.drink_now_by_player.is_empty());
    }

    #[test]
    fn test_over_allocation_rejected_without_mutation() {
        let mut session = distributing(&[("g", 10), ("a", 0), ("b", 0)], &["g", "a", "b"]);
        let before = session.clone();
        let allocations = HashMap::from([("a".to_string(), 4), ("b".to_string(), 7)]);

        let err = distribute_drinks(&mut session, "g", &allocations, &mut rng());

        assert_eq!(
            err,
            Err(GameError::OverAllocated {
                allocated: 11,
                remaining: 10
            })
        );
        assert_eq!(session, before);
    }

    #[test]
    fn test_exact_allocation_auto_finalizes() {
        let mut session = distributing(&[("g", 10), ("a", 0), ("b", 0)], &["g", "a", "b"]);
        let allocations = HashMap::from([("a".to_string(), 4), ("b".to_string(), 6)]);

        let outcome = distribute_drinks(&mut session, "g", &allocations, &mut rng()).unwrap();

        assert_eq!(
            outcome,
            DistributionOutcome {
                given: 10,
                finalized: true
            }
        );
        assert_eq!(session.game.give_out_remaining("g"), 0);
        assert_eq!(session.game.drink_now_by_player["a"], 4);
        assert_eq!(session.game.drink_now_by_player["b"], 6);
        assert_eq!(session.player("g").unwrap().given_out, 10);
        assert!(!session.game.distribution_active);
        assert_eq!(session.game.distribution_deadline, None);
    }

    #[test]
    fn test_partial_allocation_keeps_phase_open() {
        let mut session = distributing(&[("g", 10), ("a", 3)], &["g", "a"]);
        let allocations = HashMap::from([("a".to_string(), 4), ("x".to_string(), 0)]);

        let outcome = distribute_drinks(&mut session, "g", &allocations, &mut rng()).unwrap();

        assert!(!outcome.finalized);
        assert_eq!(session.game.give_out_remaining("g"), 6);
        assert!(session.game.distribution_active);
    }

    #[test]
    fn test_distribution_rejections() {
        let mut session = distributing(&[("g", 5), ("a", 0), ("out", 0)], &["g", "a"]);
        let rng = &mut rng();

        let to_self = HashMap::from([("g".to_string(), 1)]);
        assert_eq!(
            distribute_drinks(&mut session, "g", &to_self, rng),
            Err(GameError::CannotGiveToSelf)
        );
        let inactive = HashMap::from([("out".to_string(), 1)]);
        assert_eq!(
            distribute_drinks(&mut session, "g", &inactive, rng),
            Err(GameError::InvalidTarget)
        );
        let empty = HashMap::from([("a".to_string(), -3)]);
        assert_eq!(
            distribute_drinks(&mut session, "g", &empty, rng),
            Err(GameError::EmptyAllocation)
        );
        let one = HashMap::from([("g".to_string(), 1)]);
        assert_eq!(
            distribute_drinks(&mut session, "a", &one, rng),
            Err(GameError::NoDrinksLeft)
        );
        assert_eq!(
            distribute_drinks(&mut session, "", &one, rng),
            Err(GameError::PlayerRequired)
        );

        session.game.distribution_active = false;
        assert_eq!(
            distribute_drinks(&mut session, "g", &one, rng),
            Err(GameError::DistributionNotActive)
        );
    }

    #[test]
    fn test_finalize_hands_out_every_unit_never_to_giver() {
        for seed in 0..50 {
            let mut session = distributing(&[("g", 5), ("a", 0), ("b", 0)], &["g", "a", "b"]);
            let mut rng = StdRng::seed_from_u64(seed);

            let assigned = finalize_distribution(&mut session, &mut rng);

            assert_eq!(assigned, 5);
            let a = session.game.drink_now_by_player.get("a").copied().unwrap_or(0);
            let b = session.game.drink_now_by_player.get("b").copied().unwrap_or(0);
            assert_eq!(a + b, 5);
            assert!(!session.game.drink_now_by_player.contains_key("g"));
            assert_eq!(session.game.give_out_remaining("g"), 0);
            assert!(!session.game.distribution_active);
        }
    }

    #[test]
    fn test_finalize_with_single_active_player_terminates() {
        let mut session = distributing(&[("g", 5)], &["g"]);

        let assigned = finalize_distribution(&mut session, &mut rng());

        assert_eq!(assigned, 0);
        assert_eq!(session.game.give_out_remaining("g"), 5);
        assert!(!session.game.distribution_active);
    }

    #[test]
    fn test_finalize_is_noop_when_inactive() {
        let mut session = lobby(&["a"]);
        let before = session.clone();
        assert_eq!(finalize_distribution(&mut session, &mut rng()), 0);
        assert_eq!(session, before);
    }

    #[test]
    fn test_all_guessed() {
        let mut session = started(&["a", "b"], red_low_between_diamond());
        assert!(!all_guessed(&session));
        submit_guess(&mut session, "a", "red").unwrap();
        assert!(!all_guessed(&session));
        submit_guess(&mut session, "b", "black").unwrap();
        assert!(all_guessed(&session));

        session.game.active_players.clear();
        assert!(!all_guessed(&session));
    }
}
