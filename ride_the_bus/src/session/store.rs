//! Authoritative session store.

use super::{
    backend::{SessionBackend, with_timeout},
    codes::{CodeGenerator, WordCodeGenerator, normalize_code, session_key},
    config::StoreConfig,
    errors::{StoreError, StoreResult},
};
use crate::game::{
    self, DistributionOutcome, GameConfig, Player, PlayerId, RoundOutcome, Session,
    SessionStatus,
};
use chrono::{DateTime, Utc};
use std::{collections::HashMap, sync::Arc, time::Duration};
use uuid::Uuid;

/// Name given to hosts that did not pick one
pub const DEFAULT_HOST_NAME: &str = "Host";

/// Session store applying one engine transition per atomic write.
///
/// Every mutation follows load, apply, compare-and-swap. A lost race
/// reloads the fresh record and applies the transition again, so two
/// writers never both persist against the same version.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    codes: Arc<dyn CodeGenerator>,
    config: StoreConfig,
    game: GameConfig,
}

impl SessionStore {
    /// Create a new session store
    ///
    /// # Arguments
    ///
    /// * `backend` - Persistence backend shared by all replicas
    /// * `config` - Expiry and retry limits
    /// * `game` - Round timings handed to the engine
    ///
    /// # Returns
    ///
    /// * `SessionStore` - Store drawing lobby codes from [`WordCodeGenerator`]
    pub fn new(backend: Arc<dyn SessionBackend>, config: StoreConfig, game: GameConfig) -> Self {
        Self {
            backend,
            codes: Arc::new(WordCodeGenerator),
            config,
            game,
        }
    }

    /// Replace the lobby code source
    #[must_use]
    pub fn with_code_generator(mut self, codes: Arc<dyn CodeGenerator>) -> Self {
        self.codes = codes;
        self
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    #[must_use]
    pub fn game_config(&self) -> &GameConfig {
        &self.game
    }

    /// Create a lobby seeded with its host
    ///
    /// # Arguments
    ///
    /// * `host_name` - Display name, trimmed; empty falls back to `"Host"`
    ///
    /// # Returns
    ///
    /// * `StoreResult<(Session, Player)>` - New session and its host, or
    ///   [`StoreError::CodesExhausted`] when every candidate code was taken
    pub async fn create_session(&self, host_name: &str) -> StoreResult<(Session, Player)> {
        let name = match host_name.trim() {
            "" => DEFAULT_HOST_NAME,
            trimmed => trimmed,
        };
        let host = Player::new(format!("host_{}", Uuid::new_v4()), name.to_string());
        let now = Utc::now();

        for _ in 0..self.config.max_code_attempts {
            let code = normalize_code(&self.codes.generate());
            let session = Session::new(code.clone(), host.clone(), now);
            let payload = serde_json::to_string(&session)?;

            let inserted = with_timeout(
                self.config.operation_timeout,
                self.backend
                    .insert_if_absent(&session_key(&code), &payload, self.config.session_ttl),
            )
            .await?;

            if inserted {
                log::info!("Lobby {code} created by {}", host.id);
                return Ok((session, host));
            }
            log::debug!("Lobby code {code} already taken, retrying");
        }

        log::error!(
            "No free lobby code after {} attempts",
            self.config.max_code_attempts
        );
        Err(StoreError::CodesExhausted(self.config.max_code_attempts))
    }

    /// Add a player to an active lobby
    pub async fn join_session(&self, code: &str, name: &str) -> StoreResult<(Player, Session)> {
        let name = name.trim().to_string();
        let (session, player) = self
            .mutate(code, |session| {
                if session.is_closing() {
                    return Err(StoreError::SessionClosing);
                }
                if name.is_empty() {
                    return Err(StoreError::NameRequired);
                }
                let player = Player::new(format!("player_{}", Uuid::new_v4()), name.clone());
                session.players.push(player.clone());
                Ok(player)
            })
            .await?;

        log::info!("{} joined lobby {} as {}", player.id, session.code, player.name);
        Ok((player, session))
    }

    /// Fetch the current snapshot of a lobby
    pub async fn get_session(&self, code: &str) -> StoreResult<Session> {
        let code = normalize_code(code);
        let raw = self
            .load_raw(&session_key(&code))
            .await?
            .ok_or(StoreError::NotFound(code))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Mark a lobby as closing; it expires once `grace` has elapsed
    ///
    /// Closing an already-closing lobby keeps its original shutdown time.
    pub async fn close_session(&self, code: &str, grace: Duration) -> StoreResult<Session> {
        let grace = chrono::TimeDelta::from_std(grace).unwrap_or(chrono::TimeDelta::MAX);
        let (session, newly_closed) = self
            .mutate(code, |session| {
                if session.is_closing() {
                    return Ok(false);
                }
                let now = Utc::now();
                session.status = SessionStatus::Closing;
                session.shutting_down_at = Some(
                    now.checked_add_signed(grace)
                        .unwrap_or(DateTime::<Utc>::MAX_UTC),
                );
                Ok(true)
            })
            .await?;

        if newly_closed {
            log::info!("Lobby {} closing", session.code);
        }
        Ok(session)
    }

    pub async fn start_session(&self, code: &str) -> StoreResult<Session> {
        let timings = self.game;
        let (session, ()) = self
            .mutate(code, |session| {
                game::start_game(session, &timings, Utc::now(), &mut rand::rng())?;
                Ok(())
            })
            .await?;
        log::info!(
            "Lobby {} started with {} active players",
            session.code,
            session.game.active_players.len()
        );
        Ok(session)
    }

    pub async fn submit_guess(
        &self,
        code: &str,
        player_id: &str,
        guess: &str,
    ) -> StoreResult<Session> {
        let (session, _) = self
            .mutate(code, |session| {
                Ok(game::submit_guess(session, player_id, guess)?)
            })
            .await?;
        Ok(session)
    }

    pub async fn tap_out(&self, code: &str, player_id: &str) -> StoreResult<Session> {
        let (session, ()) = self
            .mutate(code, |session| Ok(game::tap_out(session, player_id)?))
            .await?;
        log::debug!("{player_id} tapped out of lobby {}", session.code);
        Ok(session)
    }

    /// Resolve whatever round the lobby is in
    pub async fn advance_round(&self, code: &str) -> StoreResult<(Session, RoundOutcome)> {
        let timings = self.game;
        self.mutate(code, |session| {
            Ok(game::advance_round(session, &timings, Utc::now())?)
        })
        .await
    }

    /// Resolve `round`, but only if the lobby is still playing it
    ///
    /// # Returns
    ///
    /// * `StoreResult<(Session, RoundOutcome)>` - Advanced session, or
    ///   [`StoreError::Superseded`] when the game ended or moved past `round`
    pub async fn advance_round_from(
        &self,
        code: &str,
        round: u8,
    ) -> StoreResult<(Session, RoundOutcome)> {
        let timings = self.game;
        self.mutate(code, |session| {
            if !session.game.started || session.game.round != round {
                return Err(StoreError::Superseded);
            }
            Ok(game::advance_round(session, &timings, Utc::now())?)
        })
        .await
    }

    pub async fn distribute_drinks(
        &self,
        code: &str,
        from_player_id: &str,
        allocations: &HashMap<PlayerId, i64>,
    ) -> StoreResult<(Session, DistributionOutcome)> {
        self.mutate(code, |session| {
            Ok(game::distribute_drinks(
                session,
                from_player_id,
                allocations,
                &mut rand::rng(),
            )?)
        })
        .await
    }

    pub async fn finalize_distribution(&self, code: &str) -> StoreResult<Session> {
        let (session, assigned) = self
            .mutate(code, |session| {
                Ok(game::finalize_distribution(session, &mut rand::rng()))
            })
            .await?;
        log::debug!(
            "Lobby {} distribution finalized, {assigned} units assigned at random",
            session.code
        );
        Ok(session)
    }

    /// Finalize only if the distribution phase still ends at `deadline`
    pub async fn finalize_distribution_at(
        &self,
        code: &str,
        deadline: DateTime<Utc>,
    ) -> StoreResult<Session> {
        let (session, assigned) = self
            .mutate(code, |session| {
                if !session.game.distribution_active
                    || session.game.distribution_deadline != Some(deadline)
                {
                    return Err(StoreError::Superseded);
                }
                Ok(game::finalize_distribution(session, &mut rand::rng()))
            })
            .await?;
        log::debug!(
            "Lobby {} distribution deadline reached, {assigned} units assigned at random",
            session.code
        );
        Ok(session)
    }

    /// Apply `apply` to the stored session and persist it atomically
    ///
    /// The closure may run more than once when concurrent writers win the
    /// compare-and-swap; it must derive everything from the session it is
    /// given. An `Err` from the closure aborts without writing.
    ///
    /// # Returns
    ///
    /// * `StoreResult<(Session, T)>` - Persisted session and the closure's
    ///   value, or [`StoreError::Contention`] once retries are exhausted
    pub async fn mutate<T, F>(&self, code: &str, mut apply: F) -> StoreResult<(Session, T)>
    where
        F: FnMut(&mut Session) -> StoreResult<T> + Send,
        T: Send,
    {
        let code = normalize_code(code);
        let key = session_key(&code);
        let attempts = self.config.max_write_attempts.max(1);

        for attempt in 1..=attempts {
            let raw = self
                .load_raw(&key)
                .await?
                .ok_or_else(|| StoreError::NotFound(code.clone()))?;
            let mut session: Session = serde_json::from_str(&raw)?;
            let value = apply(&mut session)?;
            session.version = session.version.saturating_add(1);

            let payload = serde_json::to_string(&session)?;
            let ttl = self.ttl_for(&session, Utc::now());
            let swapped = with_timeout(
                self.config.operation_timeout,
                self.backend.compare_and_swap(&key, &raw, &payload, ttl),
            )
            .await?;

            if swapped {
                return Ok((session, value));
            }
            log::debug!("Lobby {code} changed during write (attempt {attempt}/{attempts})");
            tokio::task::yield_now().await;
        }

        log::warn!("Lobby {code} write abandoned after {attempts} attempts");
        Err(StoreError::Contention { code, attempts })
    }

    async fn load_raw(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(with_timeout(self.config.operation_timeout, self.backend.load(key)).await?)
    }

    /// Active lobbies get the full TTL; closing lobbies only what is left
    /// of their grace period.
    fn ttl_for(&self, session: &Session, now: DateTime<Utc>) -> Duration {
        match session.shutting_down_at {
            Some(at) if session.is_closing() => (at - now)
                .to_std()
                .unwrap_or(Duration::ZERO)
                .max(Duration::from_millis(1)),
            _ => self.config.session_ttl,
        }
    }
}
