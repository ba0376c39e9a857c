//! Deferred round advancement and distribution finalization.
//!
//! Each lobby owns at most one pending timer. A timer carries the tag it was
//! armed with (the round number, or the exact distribution deadline) and the
//! store re-checks that tag inside the same atomic write that acts on it, so
//! a timer racing a client-driven change ends as a no-op.

use crate::{
    game::Session,
    realtime::FanoutBus,
    session::{SessionStore, StoreError, normalize_code},
};
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::{sync::Mutex, task::AbortHandle};

/// What a pending timer does when it fires
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerKind {
    /// Resolve this round if it is still being played
    Round(u8),
    /// Finalize distribution if it still ends at this deadline
    Distribution(DateTime<Utc>),
}

struct Slot {
    generation: u64,
    /// Version of the snapshot that armed this timer
    version: u64,
    kind: TimerKind,
    handle: AbortHandle,
}

/// Lobby timer scheduler
#[derive(Clone)]
pub struct Scheduler {
    store: SessionStore,
    bus: FanoutBus,
    slots: Arc<Mutex<HashMap<String, Slot>>>,
    next_generation: Arc<AtomicU64>,
}

impl Scheduler {
    pub fn new(store: SessionStore, bus: FanoutBus) -> Self {
        Self {
            store,
            bus,
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Arm whichever timer the session's phase calls for
    ///
    /// A running game gets a round timer, an open distribution phase gets a
    /// finalize timer, anything else cancels the lobby's pending timer.
    /// Snapshots reach this point out of order when writers race, so a
    /// snapshot no newer than the one that armed the pending timer is
    /// ignored.
    pub async fn schedule_after(&self, session: &Session) {
        let game = &session.game;
        let kind = if game.started {
            Some(TimerKind::Round(game.round))
        } else if game.distribution_active
            && let Some(deadline) = game.distribution_deadline
        {
            Some(TimerKind::Distribution(deadline))
        } else {
            None
        };

        let code = normalize_code(&session.code);
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get(&code)
            && slot.version >= session.version
        {
            log::debug!(
                "Lobby {code} snapshot v{} is not newer than pending timer {:?} (v{}), keeping it",
                session.version,
                slot.kind,
                slot.version
            );
            return;
        }

        if let Some(previous) = slots.remove(&code) {
            previous.handle.abort();
            if kind.is_none() {
                log::debug!("Lobby {code} timer {:?} cancelled", previous.kind);
            }
        }
        if let Some(kind) = kind {
            self.arm(&mut slots, code, kind, session.version);
        }
    }

    /// Stop every pending timer
    pub async fn cancel_all(&self) {
        let mut slots = self.slots.lock().await;
        for (_, slot) in slots.drain() {
            slot.handle.abort();
        }
    }

    /// The timer currently pending for a lobby
    pub async fn pending(&self, code: &str) -> Option<TimerKind> {
        self.slots
            .lock()
            .await
            .get(&normalize_code(code))
            .map(|slot| slot.kind)
    }

    fn arm(&self, slots: &mut HashMap<String, Slot>, code: String, kind: TimerKind, version: u64) {
        let delay = match kind {
            TimerKind::Round(_) => self.store.game_config().round_duration,
            TimerKind::Distribution(deadline) => {
                (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO)
            }
        };
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let scheduler = self.clone();
        let owned = code.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            scheduler.fire(owned, generation, kind).await;
        });
        log::debug!("Lobby {code} timer {kind:?} (v{version}) armed for {delay:?}");
        slots.insert(
            code,
            Slot {
                generation,
                version,
                kind,
                handle: task.abort_handle(),
            },
        );
    }

    fn fire(self, code: String, generation: u64, kind: TimerKind) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            // release our own slot so re-arming below never aborts this task
            {
                let mut slots = self.slots.lock().await;
                match slots.get(&code) {
                    Some(slot) if slot.generation == generation => {
                        slots.remove(&code);
                    }
                    _ => return,
                }
            }

            let result = match kind {
                TimerKind::Round(round) => self
                    .store
                    .advance_round_from(&code, round)
                    .await
                    .map(|(session, _)| session),
                TimerKind::Distribution(deadline) => {
                    self.store.finalize_distribution_at(&code, deadline).await
                }
            };

            match result {
                Ok(session) => {
                    log::info!("Lobby {code} timer {kind:?} fired");
                    self.bus.publish(&session).await;
                    self.schedule_after(&session).await;
                }
                Err(StoreError::Superseded) => {
                    log::debug!("Lobby {code} timer {kind:?} is stale, rearming from current state");
                    match self.store.get_session(&code).await {
                        Ok(current) => self.schedule_after(&current).await,
                        Err(e) => log::debug!("Lobby {code} reload after stale timer failed: {e}"),
                    }
                }
                Err(e) if e.is_not_found() => {
                    log::debug!("Lobby {code} gone before timer {kind:?} fired");
                }
                Err(e) => {
                    log::warn!("Lobby {code} timer {kind:?} failed: {e}");
                }
            }
        })
    }
}
