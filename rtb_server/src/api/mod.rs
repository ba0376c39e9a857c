//! HTTP/WebSocket API for Ride the Bus lobbies.
//!
//! # Endpoints Overview
//!
//! ```text
//! GET  /health                          - Health check
//! POST /api/lobbies                     - Create a lobby with a generated host
//! GET  /api/lobbies/{code}              - Current session snapshot
//! POST /api/lobbies/{code}/join         - Join with {"name"}
//! POST /api/lobbies/{code}/close        - Start the closing grace period
//! POST /api/lobbies/{code}/start        - Deal and start a game
//! POST /api/lobbies/{code}/choice       - Submit {"playerId"|"nickname", "choice"}
//! POST /api/lobbies/{code}/next         - Force the round to resolve
//! POST /api/lobbies/{code}/distribute   - Hand out {"allocations": {id: n}}
//! POST /api/lobbies/{code}/tap          - Request a tap-out
//! GET  /api/lobbies/{code}/ws           - Realtime session snapshots
//! ```
//!
//! Every mutation is pushed to connected clients on all replicas, so
//! clients can treat HTTP responses as acknowledgements only.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use rtb_server::api::{AppState, create_router};
//! # use ride_the_bus::LobbyService;
//! # async fn example(service: LobbyService) -> Result<(), Box<dyn std::error::Error>> {
//! let state = AppState::new(service, std::time::Duration::from_secs(30), "*");
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod lobbies;
pub mod request_id;
pub mod websocket;

use axum::{
    Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Json},
    routing::{get, post},
};
use ride_the_bus::{ErrorKind, LobbyService, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

/// Application state shared across all HTTP handlers and WebSocket connections.
#[derive(Clone)]
pub struct AppState {
    pub service: LobbyService,
    /// Grace period applied by `POST /close`
    pub close_grace: Duration,
    pub allowed_origin: String,
}

impl AppState {
    pub fn new(service: LobbyService, close_grace: Duration, allowed_origin: &str) -> Self {
        Self {
            service,
            close_grace,
            allowed_origin: allowed_origin.to_string(),
        }
    }
}

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Failed request, ready to be returned from a handler
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub type ApiResult<T> = Result<T, ApiError>;

/// HTTP status for a store failure
pub fn status_for(err: &StoreError) -> StatusCode {
    if err.is_not_found() {
        return StatusCode::NOT_FOUND;
    }
    match err.kind() {
        ErrorKind::Validation | ErrorKind::State => StatusCode::BAD_REQUEST,
        ErrorKind::Concurrency => StatusCode::CONFLICT,
        ErrorKind::Resource => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Convert a store failure into a client-safe response
pub fn store_error(err: StoreError) -> ApiError {
    let status = status_for(&err);
    if status == StatusCode::SERVICE_UNAVAILABLE {
        log::error!("Lobby backend failure: {err}");
    }
    (
        status,
        Json(ErrorResponse {
            error: err.client_message(),
        }),
    )
}

pub fn bad_request(message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

/// Create the API router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.allowed_origin);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/lobbies", post(lobbies::create_lobby))
        .route("/api/lobbies/{code}", get(lobbies::get_lobby))
        .route("/api/lobbies/{code}/join", post(lobbies::join_lobby))
        .route("/api/lobbies/{code}/close", post(lobbies::close_lobby))
        .route("/api/lobbies/{code}/start", post(lobbies::start_game))
        .route("/api/lobbies/{code}/choice", post(lobbies::submit_choice))
        .route("/api/lobbies/{code}/next", post(lobbies::next_round))
        .route("/api/lobbies/{code}/distribute", post(lobbies::distribute))
        .route("/api/lobbies/{code}/tap", post(lobbies::tap_out))
        .route("/api/lobbies/{code}/ws", get(websocket::websocket_handler))
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(allowed_origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if allowed_origin.trim() == "*" {
        return layer.allow_origin(Any);
    }
    match HeaderValue::from_str(allowed_origin.trim()) {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            log::warn!("Ignoring unusable ALLOWED_ORIGIN {allowed_origin:?}, allowing any origin");
            layer.allow_origin(Any)
        }
    }
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "rooms": state.service.hub().room_count().await,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}
