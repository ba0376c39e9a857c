//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use ride_the_bus::{GameConfig, StoreConfig, realtime::HubConfig};
use std::{fmt, net::SocketAddr, str::FromStr, time::Duration};

/// Default listen address
pub const DEFAULT_BIND: &str = "0.0.0.0:3000";

/// Default Redis connection string
pub const DEFAULT_REDIS_URL: &str = "redis://redis:6379";

/// Where lobby sessions are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Shared Redis instance; required for more than one replica
    Redis,
    /// Process-local map, for development and tests
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown store backend {other:?}")),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redis => write!(f, "redis"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    pub store_backend: StoreBackend,
    pub redis_url: String,
    /// Value sent as `Access-Control-Allow-Origin`; `*` allows any origin
    pub allowed_origin: String,
    /// Prometheus listener, disabled when unset
    pub metrics_bind: Option<SocketAddr>,
    pub game: GameConfig,
    pub store: StoreConfig,
    pub hub: HubConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `redis_url_override` - Optional Redis URL override (from CLI args)
    /// * `backend_override` - Optional store backend override (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set but cannot be parsed
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        redis_url_override: Option<String>,
        backend_override: Option<StoreBackend>,
    ) -> Result<Self, ConfigError> {
        let bind = match bind_override {
            Some(bind) => bind,
            None => parse_env_required("SERVER_BIND", DEFAULT_BIND)?,
        };

        let store_backend = match backend_override {
            Some(backend) => backend,
            None => parse_env_required("STORE_BACKEND", "redis")?,
        };

        let redis_url = redis_url_override
            .or_else(|| std::env::var("REDIS_URL").ok())
            .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string());

        if store_backend == StoreBackend::Redis && redis_url.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                var: "REDIS_URL".to_string(),
                hint: "Set REDIS_URL or run with --memory".to_string(),
            });
        }

        let allowed_origin = std::env::var("ALLOWED_ORIGIN").unwrap_or_else(|_| "*".to_string());

        let metrics_bind = match std::env::var("METRICS_BIND") {
            Ok(raw) if !raw.trim().is_empty() => {
                Some(raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    var: "METRICS_BIND".to_string(),
                    reason: format!("{raw:?} is not an IP:PORT address"),
                })?)
            }
            _ => None,
        };

        let defaults = GameConfig::default();
        let game = GameConfig {
            round_duration: secs_env_or("ROUND_DURATION_SECS", defaults.round_duration),
            distribution_duration: secs_env_or(
                "DISTRIBUTION_DURATION_SECS",
                defaults.distribution_duration,
            ),
        };

        let defaults = StoreConfig::default();
        let store = StoreConfig {
            session_ttl: secs_env_or("SESSION_TTL_SECS", defaults.session_ttl),
            close_grace: secs_env_or("CLOSE_GRACE_SECS", defaults.close_grace),
            ..defaults
        };

        let defaults = HubConfig::default();
        let hub = HubConfig {
            idle_close_after: secs_env_or("IDLE_CLOSE_SECS", defaults.idle_close_after),
            ..defaults
        };

        Ok(ServerConfig {
            bind,
            store_backend,
            redis_url,
            allowed_origin,
            metrics_bind,
            game,
            store,
            hub,
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.game.validate().map_err(|reason| ConfigError::Invalid {
            var: "ROUND_DURATION_SECS/DISTRIBUTION_DURATION_SECS".to_string(),
            reason,
        })?;

        self.store.validate().map_err(|reason| ConfigError::Invalid {
            var: "SESSION_TTL_SECS/CLOSE_GRACE_SECS".to_string(),
            reason,
        })?;

        if self.hub.idle_close_after.is_zero() {
            return Err(ConfigError::Invalid {
                var: "IDLE_CLOSE_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.allowed_origin.trim().is_empty() {
            return Err(ConfigError::Invalid {
                var: "ALLOWED_ORIGIN".to_string(),
                reason: "Must be an origin or *".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Like [`parse_env_or`] but a present, unparsable value is an error
fn parse_env_required<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
{
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        var: key.to_string(),
        reason: format!("cannot parse {raw:?}"),
    })
}

fn secs_env_or(key: &str, default: Duration) -> Duration {
    Duration::from_secs(parse_env_or(key, default.as_secs()))
}
