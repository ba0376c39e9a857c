//! Structured logging setup.
//!
//! `log` records emitted by the lobby library are bridged into the same
//! `tracing` pipeline as the server's own events.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,hyper=warn,redis=warn";

/// Initialize structured logging
///
/// Levels are configurable via the `RUST_LOG` env var.
///
/// # Example
///
/// ```no_run
/// use rtb_server::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("Server starting");
/// }
/// ```
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log the outcome of a lobby operation
pub fn log_lobby_operation(operation: &str, code: &str, outcome: Result<(), &str>) {
    match outcome {
        Ok(()) => tracing::debug!(operation = operation, lobby = code, "Lobby operation"),
        Err(reason) => tracing::info!(
            operation = operation,
            lobby = code,
            reason = reason,
            "Lobby operation rejected"
        ),
    }
}
