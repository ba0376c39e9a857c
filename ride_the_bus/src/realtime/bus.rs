//! Cross-replica fan-out of session snapshots over Redis pub/sub.

use super::hub::ConnectionHub;
use crate::{
    game::{ErrorKind, Session},
    session::codes::{LOBBY_CHANNEL_PREFIX, lobby_channel},
};
use futures_util::StreamExt;
use redis::{AsyncCommands, aio::ConnectionManager};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Delay before resubscribing after the subscription drops
pub const RESUBSCRIBE_BACKOFF: Duration = Duration::from_secs(1);

/// Fan-out errors
#[derive(Debug, Error)]
pub enum BusError {
    /// Redis error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Snapshot could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BusError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Resource
    }
}

/// Redis pub/sub link shared by every replica.
#[derive(Clone)]
pub struct RedisBus {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisBus {
    /// Connect to `url` and verify the server with a PING
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(url)?;
        let mut conn = client.get_connection_manager().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        log::info!("Lobby fan-out connected to {url}");
        Ok(Self { client, conn })
    }

    /// Publish a snapshot on the lobby's topic
    pub async fn publish(&self, session: &Session) -> Result<(), BusError> {
        let payload = serde_json::to_string(session)?;
        let mut conn = self.conn.clone();
        let receivers: i64 = conn.publish(lobby_channel(&session.code), payload).await?;
        log::debug!(
            "Lobby {} snapshot published to {receivers} replicas",
            session.code
        );
        Ok(())
    }

    /// Relay every lobby topic into `hub` until the task is aborted
    ///
    /// A dropped subscription is re-established after [`RESUBSCRIBE_BACKOFF`].
    pub fn spawn_subscriber(&self, hub: ConnectionHub) -> JoinHandle<()> {
        let client = self.client.clone();
        tokio::spawn(async move {
            loop {
                match relay(&client, &hub).await {
                    Ok(()) => log::warn!("Lobby subscription ended, resubscribing"),
                    Err(e) => log::warn!("Lobby subscription failed: {e}"),
                }
                tokio::time::sleep(RESUBSCRIBE_BACKOFF).await;
            }
        })
    }
}

async fn relay(client: &redis::Client, hub: &ConnectionHub) -> Result<(), BusError> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub
        .psubscribe(format!("{LOBBY_CHANNEL_PREFIX}*"))
        .await?;
    log::info!("Subscribed to {LOBBY_CHANNEL_PREFIX}* topics");

    let mut messages = pubsub.on_message();
    while let Some(msg) = messages.next().await {
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("Unreadable payload on {}: {e}", msg.get_channel_name());
                continue;
            }
        };
        match serde_json::from_str::<Session>(&payload) {
            Ok(session) => {
                hub.broadcast_session(&session).await;
            }
            Err(e) => log::warn!("Discarding malformed snapshot on {}: {e}", msg.get_channel_name()),
        }
    }
    Ok(())
}

/// Delivers snapshots to every replica when Redis is available, or to this
/// replica's connections only when it is not.
#[derive(Clone)]
pub struct FanoutBus {
    redis: Option<RedisBus>,
    hub: ConnectionHub,
}

impl FanoutBus {
    /// Single-replica fan-out straight into the local hub
    #[must_use]
    pub fn local(hub: ConnectionHub) -> Self {
        Self { redis: None, hub }
    }

    #[must_use]
    pub fn with_redis(redis: RedisBus, hub: ConnectionHub) -> Self {
        Self {
            redis: Some(redis),
            hub,
        }
    }

    #[must_use]
    pub fn hub(&self) -> &ConnectionHub {
        &self.hub
    }

    #[must_use]
    pub fn is_replicated(&self) -> bool {
        self.redis.is_some()
    }

    /// Fan a snapshot out. Never fails: a Redis error degrades to a local
    /// broadcast.
    pub async fn publish(&self, session: &Session) {
        let Some(redis) = &self.redis else {
            self.hub.broadcast_session(session).await;
            return;
        };
        if let Err(e) = redis.publish(session).await {
            log::warn!(
                "Lobby {} publish failed, delivering locally only: {e}",
                session.code
            );
            self.hub.broadcast_session(session).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{game::Player, realtime::HubConfig};
    use chrono::Utc;

    #[tokio::test]
    async fn test_local_bus_broadcasts_to_hub() {
        let (hub, _idle) = ConnectionHub::new(HubConfig::default());
        let bus = FanoutBus::local(hub.clone());
        let (_, mut rx) = hub.register("BRAVE-OTTER-JUMPS").await;

        let host = Player::new("host_1".to_string(), "Host".to_string());
        let session = Session::new("BRAVE-OTTER-JUMPS".to_string(), host, Utc::now());
        bus.publish(&session).await;

        let push: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(push["session"]["code"], "BRAVE-OTTER-JUMPS");
        assert!(!bus.is_replicated());
    }
}
