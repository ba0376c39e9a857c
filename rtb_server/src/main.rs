//! Ride the Bus lobby server.
//!
//! Sessions live in Redis so any number of replicas can run behind a load
//! balancer; Redis pub/sub carries every snapshot to the replica holding
//! each client's WebSocket.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Error};
use log::{info, warn};
use pico_args::Arguments;
use ride_the_bus::{
    LobbyService, SessionStore,
    realtime::{ConnectionHub, FanoutBus, RedisBus},
    session::{MemoryBackend, RedisBackend, SessionBackend},
};
use rtb_server::{
    api,
    config::{ServerConfig, StoreBackend},
    logging, metrics,
};
use tokio::task::JoinHandle;

const HELP: &str = "\
Run a Ride the Bus lobby server

USAGE:
  rtb_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 0.0.0.0:3000]
  --redis-url  URL         Redis connection string     [default: env REDIS_URL or redis://redis:6379]

FLAGS:
  --memory                 Keep sessions in process memory (single replica only)
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  REDIS_URL                Redis connection string
  STORE_BACKEND            redis | memory
  ALLOWED_ORIGIN           CORS origin, * for any
  METRICS_BIND             Prometheus listener address (disabled when unset)
  ROUND_DURATION_SECS      Time per guessing round
  DISTRIBUTION_DURATION_SECS
                           Time to hand out earned drinks
  SESSION_TTL_SECS         Lobby expiry, renewed on every change
  CLOSE_GRACE_SECS         Lifetime of a lobby after it starts closing
  IDLE_CLOSE_SECS          Close lobbies with no connections for this long
  RUST_LOG                 Log filter
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let bind_override: Option<SocketAddr> = pargs.opt_value_from_str("--bind")?;
    let redis_url_override: Option<String> = pargs.opt_value_from_str("--redis-url")?;
    let backend_override = pargs.contains("--memory").then_some(StoreBackend::Memory);

    let config = ServerConfig::from_env(bind_override, redis_url_override, backend_override)?;
    config.validate()?;

    logging::init();
    info!("Starting Ride the Bus server at {}", config.bind);

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(|e| anyhow::anyhow!(e))?;
        info!("Prometheus metrics listening on {addr}");
    }

    let (hub, idle) = ConnectionHub::new(config.hub);

    let (backend, bus, subscriber): (Arc<dyn SessionBackend>, FanoutBus, Option<JoinHandle<()>>) =
        match config.store_backend {
            StoreBackend::Redis => {
                info!("Connecting to Redis at {}", config.redis_url);
                let backend = RedisBackend::connect(&config.redis_url)
                    .await
                    .context("Failed to connect session store to Redis")?;
                let redis_bus = RedisBus::connect(&config.redis_url)
                    .await
                    .context("Failed to connect fan-out bus to Redis")?;
                let subscriber = redis_bus.spawn_subscriber(hub.clone());
                let backend: Arc<dyn SessionBackend> = Arc::new(backend);
                (
                    backend,
                    FanoutBus::with_redis(redis_bus, hub),
                    Some(subscriber),
                )
            }
            StoreBackend::Memory => {
                warn!("Using in-memory session store; lobbies will not survive a restart");
                let backend: Arc<dyn SessionBackend> = Arc::new(MemoryBackend::new());
                (backend, FanoutBus::local(hub), None)
            }
        };

    let store = SessionStore::new(backend, config.store, config.game);
    let service = LobbyService::new(store, bus);
    let reaper = service.spawn_idle_reaper(idle);

    let state = api::AppState::new(
        service.clone(),
        config.store.close_grace,
        &config.allowed_origin,
    );
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down server...");
    service.shutdown().await;
    reaper.abort();
    if let Some(subscriber) = subscriber {
        subscriber.abort();
    }

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C, shutting down: {e}");
        return;
    }
    info!("Received Ctrl+C, starting graceful shutdown");
}
