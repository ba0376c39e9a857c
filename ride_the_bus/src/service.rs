//! Lobby operations as consumed by the HTTP and WebSocket layer.
//!
//! Every successful mutation is fanned out to all replicas and followed by
//! scheduling, so callers never deal with the bus or timers directly.

use crate::{
    game::{self, Player, PlayerId, Session},
    realtime::{ConnectionHub, ConnectionId, FanoutBus},
    scheduler::Scheduler,
    session::{SessionStore, StoreError, StoreResult},
};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    sync::mpsc::{Receiver, UnboundedReceiver},
    task::JoinHandle,
};

/// Lobby service
#[derive(Clone)]
pub struct LobbyService {
    store: SessionStore,
    bus: FanoutBus,
    scheduler: Scheduler,
}

impl LobbyService {
    pub fn new(store: SessionStore, bus: FanoutBus) -> Self {
        let scheduler = Scheduler::new(store.clone(), bus.clone());
        Self {
            store,
            bus,
            scheduler,
        }
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    #[must_use]
    pub fn hub(&self) -> &ConnectionHub {
        self.bus.hub()
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Create a lobby; returns it together with its host
    pub async fn create_session(&self, host_name: &str) -> StoreResult<(Session, Player)> {
        let (session, host) = self.store.create_session(host_name).await?;
        self.bus.publish(&session).await;
        Ok((session, host))
    }

    pub async fn join(&self, code: &str, name: &str) -> StoreResult<(Player, Session)> {
        let (player, session) = self.store.join_session(code, name).await?;
        self.bus.publish(&session).await;
        Ok((player, session))
    }

    pub async fn get(&self, code: &str) -> StoreResult<Session> {
        self.store.get_session(code).await
    }

    /// Find a player by id, falling back to an exact display-name match
    pub async fn resolve_player(
        &self,
        code: &str,
        player_id: Option<&str>,
        nickname: Option<&str>,
    ) -> StoreResult<Option<PlayerId>> {
        if let Some(id) = player_id.filter(|id| !id.is_empty()) {
            return Ok(Some(id.to_string()));
        }
        let Some(name) = nickname.filter(|name| !name.is_empty()) else {
            return Ok(None);
        };
        let session = self.store.get_session(code).await?;
        Ok(session.player_by_name(name).map(|p| p.id.clone()))
    }

    /// Start closing a lobby; it expires after `grace`
    pub async fn close(&self, code: &str, grace: Duration) -> StoreResult<Session> {
        let session = self.store.close_session(code, grace).await?;
        self.bus.publish(&session).await;
        Ok(session)
    }

    pub async fn start(&self, code: &str) -> StoreResult<Session> {
        let session = self.store.start_session(code).await?;
        self.settle(&session).await;
        Ok(session)
    }

    /// Record a guess, advancing at once if it was the last one outstanding
    ///
    /// # Returns
    ///
    /// * `StoreResult<Session>` - Latest snapshot, already advanced when the
    ///   round resolved
    pub async fn submit_guess(
        &self,
        code: &str,
        player_id: &str,
        guess: &str,
    ) -> StoreResult<Session> {
        let session = self.store.submit_guess(code, player_id, guess).await?;
        self.bus.publish(&session).await;
        Ok(self.advance_if_all_guessed(session).await)
    }

    pub async fn advance_round(&self, code: &str) -> StoreResult<Session> {
        let (session, outcome) = self.store.advance_round(code).await?;
        log::info!("Lobby {} advanced: {outcome:?}", session.code);
        self.settle(&session).await;
        Ok(session)
    }

    pub async fn tap_out(&self, code: &str, player_id: &str) -> StoreResult<Session> {
        let session = self.store.tap_out(code, player_id).await?;
        self.bus.publish(&session).await;
        Ok(self.advance_if_all_guessed(session).await)
    }

    pub async fn distribute(
        &self,
        code: &str,
        from_player_id: &str,
        allocations: &HashMap<PlayerId, i64>,
    ) -> StoreResult<Session> {
        let (session, outcome) = self
            .store
            .distribute_drinks(code, from_player_id, allocations)
            .await?;
        log::debug!(
            "{from_player_id} gave out {} units in lobby {}",
            outcome.given,
            session.code
        );
        self.settle(&session).await;
        Ok(session)
    }

    pub async fn finalize_distribution(&self, code: &str) -> StoreResult<Session> {
        let session = self.store.finalize_distribution(code).await?;
        self.settle(&session).await;
        Ok(session)
    }

    /// Join a lobby room; the lobby's snapshot is pushed to the room at once
    ///
    /// # Returns
    ///
    /// * `StoreResult<(ConnectionId, Receiver<Arc<str>>)>` - Connection
    ///   handle and its push queue, or [`StoreError::NotFound`]
    pub async fn connect(&self, code: &str) -> StoreResult<(ConnectionId, Receiver<Arc<str>>)> {
        let session = self.store.get_session(code).await?;
        let (id, rx) = self.hub().register(&session.code).await;
        self.hub().broadcast_session(&session).await;
        Ok((id, rx))
    }

    pub async fn disconnect(&self, code: &str, id: ConnectionId) {
        self.hub().unregister(code, id).await;
    }

    /// Close lobbies reported idle by the hub
    pub fn spawn_idle_reaper(&self, mut idle: UnboundedReceiver<String>) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            while let Some(code) = idle.recv().await {
                let grace = service.store.config().close_grace;
                match service.close(&code, grace).await {
                    Ok(_) => log::info!("Lobby {code} auto-closed after inactivity"),
                    Err(e) if e.is_not_found() => {
                        log::debug!("Idle lobby {code} already expired");
                    }
                    Err(e) => log::warn!("Failed to close idle lobby {code}: {e}"),
                }
            }
        })
    }

    /// Cancel every pending timer
    pub async fn shutdown(&self) {
        self.scheduler.cancel_all().await;
    }

    async fn settle(&self, session: &Session) {
        self.bus.publish(session).await;
        self.scheduler.schedule_after(session).await;
    }

    async fn advance_if_all_guessed(&self, session: Session) -> Session {
        if !game::all_guessed(&session) {
            return session;
        }

        match self
            .store
            .advance_round_from(&session.code, session.game.round)
            .await
        {
            Ok((next, outcome)) => {
                log::info!("Lobby {} advanced early, everyone answered: {outcome:?}", next.code);
                self.settle(&next).await;
                next
            }
            Err(StoreError::Superseded) => session,
            Err(e) => {
                log::warn!("Lobby {} early advance failed: {e}", session.code);
                session
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        game::GameConfig,
        realtime::HubConfig,
        scheduler::TimerKind,
        session::{MemoryBackend, StoreConfig},
    };

    fn service() -> (LobbyService, UnboundedReceiver<String>) {
        let store = SessionStore::new(
            Arc::new(MemoryBackend::new()),
            StoreConfig::default(),
            GameConfig::default(),
        );
        let (hub, idle) = ConnectionHub::new(HubConfig {
            idle_close_after: Duration::from_secs(60),
            ..HubConfig::default()
        });
        (LobbyService::new(store, FanoutBus::local(hub)), idle)
    }

    #[tokio::test]
    async fn test_last_guess_advances_round() {
        let (service, _idle) = service();
        let (session, _) = service.create_session("Host").await.unwrap();
        let (a, _) = service.join(&session.code, "Ari").await.unwrap();
        let (b, _) = service.join(&session.code, "Bo").await.unwrap();
        service.start(&session.code).await.unwrap();

        let after_first = service.submit_guess(&session.code, &a.id, "red").await.unwrap();
        assert_eq!(after_first.game.round, 0);

        let after_second = service.submit_guess(&session.code, &b.id, "black").await.unwrap();
        assert_eq!(after_second.game.round, 1);
        assert_eq!(after_second.game.active_players.len(), 1);
        assert_eq!(
            service.scheduler().pending(&session.code).await,
            Some(TimerKind::Round(1))
        );
    }

    #[tokio::test]
    async fn test_connect_pushes_snapshot_and_rejects_unknown_lobby() {
        let (service, _idle) = service();
        let (session, _) = service.create_session("Host").await.unwrap();

        let (id, mut rx) = service.connect(&session.code).await.unwrap();
        let push: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(push["type"], "session");
        assert_eq!(push["session"]["code"], session.code);

        service.join(&session.code, "Kim").await.unwrap();
        let push: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(push["session"]["players"].as_array().unwrap().len(), 2);

        service.disconnect(&session.code, id).await;
        assert_eq!(service.hub().connection_count(&session.code).await, 0);

        assert!(
            service
                .connect("MISSING-LOBBY-CODE")
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_resolve_player_by_nickname() {
        let (service, _idle) = service();
        let (session, _) = service.create_session("Host").await.unwrap();
        let (kim, _) = service.join(&session.code, "Kim").await.unwrap();

        let by_name = service
            .resolve_player(&session.code, Some(""), Some("Kim"))
            .await
            .unwrap();
        assert_eq!(by_name, Some(kim.id));

        let by_id = service
            .resolve_player(&session.code, Some("player_x"), Some("Kim"))
            .await
            .unwrap();
        assert_eq!(by_id.as_deref(), Some("player_x"));

        let nobody = service
            .resolve_player(&session.code, None, Some("Nobody"))
            .await
            .unwrap();
        assert_eq!(nobody, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_reaper_closes_lobby() {
        let (service, idle) = service();
        let reaper = service.spawn_idle_reaper(idle);
        let (session, _) = service.create_session("Host").await.unwrap();

        let (id, _rx) = service.connect(&session.code).await.unwrap();
        service.disconnect(&session.code, id).await;
        tokio::time::sleep(Duration::from_secs(61)).await;

        let closed = service.get(&session.code).await.unwrap();
        assert!(closed.is_closing());
        reaper.abort();
    }
}
