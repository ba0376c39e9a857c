//! Per-replica registry of realtime connections, grouped into lobby rooms.

use super::{config::HubConfig, messages::PushMessage};
use crate::{game::Session, session::normalize_code};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::{
    sync::{Mutex, RwLock, mpsc},
    task::AbortHandle,
};

/// Identifies one connection within this replica
pub type ConnectionId = u64;

type Room = HashMap<ConnectionId, mpsc::Sender<Arc<str>>>;

struct IdleTimer {
    generation: u64,
    handle: AbortHandle,
}

/// Connection hub
///
/// Rooms are guarded by one reader/writer lock: broadcasts share it,
/// registration and removal take it exclusively. Idle timers live in a
/// separate table so timer bookkeeping never blocks delivery.
#[derive(Clone)]
pub struct ConnectionHub {
    rooms: Arc<RwLock<HashMap<String, Room>>>,
    idle_timers: Arc<Mutex<HashMap<String, IdleTimer>>>,
    next_connection: Arc<AtomicU64>,
    next_generation: Arc<AtomicU64>,
    idle_tx: mpsc::UnboundedSender<String>,
    config: HubConfig,
}

impl ConnectionHub {
    /// Create a new hub
    ///
    /// # Returns
    ///
    /// * `(ConnectionHub, UnboundedReceiver<String>)` - The hub and the
    ///   stream of lobby codes whose rooms stayed empty for
    ///   `idle_close_after`
    pub fn new(config: HubConfig) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (idle_tx, idle_rx) = mpsc::unbounded_channel();
        let hub = Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            idle_timers: Arc::new(Mutex::new(HashMap::new())),
            next_connection: Arc::new(AtomicU64::new(1)),
            next_generation: Arc::new(AtomicU64::new(1)),
            idle_tx,
            config,
        };
        (hub, idle_rx)
    }

    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Add a connection to a lobby room and cancel its idle timer
    ///
    /// # Returns
    ///
    /// * `(ConnectionId, Receiver<Arc<str>>)` - Handle for [`Self::unregister`]
    ///   and the queue of encoded pushes for this connection
    pub async fn register(&self, code: &str) -> (ConnectionId, mpsc::Receiver<Arc<str>>) {
        let code = normalize_code(code);
        self.cancel_idle_timer(&code).await;

        let id = self.next_connection.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.config.connection_buffer.max(1));

        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(code.clone()).or_default();
        room.insert(id, tx);
        log::debug!(
            "Connection {id} joined lobby {code} ({} connected)",
            room.len()
        );

        (id, rx)
    }

    /// Remove a connection; the last one out arms the idle timer
    pub async fn unregister(&self, code: &str, id: ConnectionId) {
        let code = normalize_code(code);
        let emptied = {
            let mut rooms = self.rooms.write().await;
            let Some(room) = rooms.get_mut(&code) else {
                return;
            };
            if room.remove(&id).is_none() {
                return;
            }
            log::debug!("Connection {id} left lobby {code}");
            let empty = room.is_empty();
            if empty {
                rooms.remove(&code);
            }
            empty
        };

        if emptied {
            self.arm_idle_timer(&code).await;
        }
    }

    /// Push a session snapshot to every connection in its room
    ///
    /// The snapshot is encoded once. Connections whose queue is closed or
    /// full are removed without affecting delivery to the others.
    ///
    /// # Returns
    ///
    /// * `usize` - Number of connections the push was queued for
    pub async fn broadcast_session(&self, session: &Session) -> usize {
        let payload: Arc<str> = match PushMessage::encode_session(session) {
            Ok(encoded) => encoded.into(),
            Err(e) => {
                log::error!("Failed to encode lobby {} snapshot: {e}", session.code);
                return 0;
            }
        };
        self.broadcast_payload(&session.code, payload).await
    }

    /// Push an already encoded message to every connection in a room
    pub async fn broadcast_payload(&self, code: &str, payload: Arc<str>) -> usize {
        let code = normalize_code(code);
        let mut delivered = 0;
        let mut dropped = Vec::new();

        {
            let rooms = self.rooms.read().await;
            let Some(room) = rooms.get(&code) else {
                return 0;
            };
            for (id, sender) in room {
                match sender.try_send(Arc::clone(&payload)) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        log::warn!("Connection {id} in lobby {code} is not keeping up, dropping it");
                        dropped.push(*id);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        log::debug!("Connection {id} in lobby {code} closed, removing");
                        dropped.push(*id);
                    }
                }
            }
        }

        for id in dropped {
            self.unregister(&code, id).await;
        }
        delivered
    }

    /// Open connections in a lobby room on this replica
    pub async fn connection_count(&self, code: &str) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(&normalize_code(code)).map_or(0, HashMap::len)
    }

    /// Lobbies with at least one open connection on this replica
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Whether an idle timer is pending for a lobby
    pub async fn idle_timer_armed(&self, code: &str) -> bool {
        self.idle_timers
            .lock()
            .await
            .contains_key(&normalize_code(code))
    }

    async fn cancel_idle_timer(&self, code: &str) {
        if let Some(timer) = self.idle_timers.lock().await.remove(code) {
            timer.handle.abort();
            log::debug!("Idle timer for lobby {code} cancelled");
        }
    }

    async fn arm_idle_timer(&self, code: &str) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let idle_after = self.config.idle_close_after;
        let mut timers = self.idle_timers.lock().await;
        if let Some(previous) = timers.remove(code) {
            previous.handle.abort();
        }

        let hub = self.clone();
        let owned = code.to_string();
        let task = tokio::spawn(async move {
            tokio::time::sleep(idle_after).await;
            hub.idle_timer_fired(owned, generation).await;
        });

        timers.insert(
            code.to_string(),
            IdleTimer {
                generation,
                handle: task.abort_handle(),
            },
        );
        log::debug!("Idle timer for lobby {code} armed for {idle_after:?}");
    }

    async fn idle_timer_fired(&self, code: String, generation: u64) {
        {
            let mut timers = self.idle_timers.lock().await;
            match timers.get(&code) {
                Some(timer) if timer.generation == generation => {
                    timers.remove(&code);
                }
                _ => return,
            }
        }

        // registration takes the write lock, so no connection can join
        // between the emptiness check and the notification
        let rooms = self.rooms.read().await;
        if rooms.get(&code).is_some_and(|room| !room.is_empty()) {
            return;
        }

        log::info!("Lobby {code} idle with no connections, requesting close");
        if self.idle_tx.send(code).is_err() {
            log::debug!("Idle notification dropped, nobody is listening");
        }
    }
}
