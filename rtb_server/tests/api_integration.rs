//! Integration tests for the lobby HTTP API.
//!
//! The router runs in-process over the in-memory session store.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use ride_the_bus::{
    GameConfig, LobbyService, SessionStore, StoreConfig,
    realtime::{ConnectionHub, FanoutBus, HubConfig},
    session::MemoryBackend,
};
use rtb_server::api::{AppState, create_router};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tower::ServiceExt; // For `oneshot` method

/// Helper to create the router over a fresh in-memory store
fn create_test_server(allowed_origin: &str) -> (axum::Router, UnboundedReceiver<String>) {
    let store = SessionStore::new(
        Arc::new(MemoryBackend::new()),
        StoreConfig::default(),
        GameConfig::default(),
    );
    let (hub, idle) = ConnectionHub::new(HubConfig::default());
    let service = LobbyService::new(store, FanoutBus::local(hub));
    let state = AppState::new(service, Duration::from_secs(30), allowed_origin);
    (create_router(state), idle)
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

/// Create a lobby and return its code and host id
async fn create_lobby(app: &axum::Router) -> (String, String) {
    let (status, body) = send(app, "POST", "/api/lobbies", None).await;
    assert_eq!(status, StatusCode::CREATED);
    (
        body["session"]["code"].as_str().unwrap().to_string(),
        body["hostId"].as_str().unwrap().to_string(),
    )
}

async fn join(app: &axum::Router, code: &str, name: &str) -> String {
    let uri = format!("/api/lobbies/{code}/join");
    let (status, body) = send(app, "POST", &uri, Some(json!({ "name": name }))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["playerId"].as_str().unwrap().to_string()
}

// ============================================================================
// Health and middleware
// ============================================================================

#[tokio::test]
async fn test_health_check_endpoint() {
    let (app, _idle) = create_test_server("*");

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let (app, _idle) = create_test_server("*");

    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "trace-42")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.headers()["x-request-id"], "trace-42");
}

#[tokio::test]
async fn test_cors_preflight_uses_configured_origin() {
    let (app, _idle) = create_test_server("https://bus.example");

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/api/lobbies")
        .header("origin", "https://bus.example")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "https://bus.example"
    );
}

// ============================================================================
// Lobby lifecycle
// ============================================================================

#[tokio::test]
async fn test_create_lobby_generates_host() {
    let (app, _idle) = create_test_server("*");

    let (status, body) = send(&app, "POST", "/api/lobbies", None).await;

    assert_eq!(status, StatusCode::CREATED);
    let host_id = body["hostId"].as_str().unwrap();
    assert!(host_id.starts_with("host_"));
    assert_eq!(body["session"]["hostId"], host_id);

    let host_name = body["session"]["players"][0]["name"].as_str().unwrap();
    assert!(host_name.starts_with("Host_"));
    assert_eq!(host_name.len(), "Host_".len() + 16);

    let code = body["session"]["code"].as_str().unwrap();
    assert_eq!(code.split('-').count(), 3);
    assert_eq!(code, code.to_uppercase());
}

#[tokio::test]
async fn test_get_lobby_normalizes_code() {
    let (app, _idle) = create_test_server("*");
    let (code, _) = create_lobby(&app).await;

    let uri = format!("/api/lobbies/{}", code.to_lowercase());
    let (status, body) = send(&app, "GET", &uri, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], code.as_str());
}

#[tokio::test]
async fn test_unknown_lobby_is_not_found() {
    let (app, _idle) = create_test_server("*");

    let (status, body) = send(&app, "GET", "/api/lobbies/NO-SUCH-LOBBY", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Session not found");

    let (status, _) = send(
        &app,
        "POST",
        "/api/lobbies/NO-SUCH-LOBBY/join",
        Some(json!({ "name": "Kim" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_join_requires_name() {
    let (app, _idle) = create_test_server("*");
    let (code, _) = create_lobby(&app).await;

    let uri = format!("/api/lobbies/{code}/join");
    let (status, _) = send(&app, "POST", &uri, Some(json!({ "name": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // A missing body reads as an empty name
    let (status, _) = send(&app, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let player_id = join(&app, &code, "Kim").await;
    assert!(player_id.starts_with("player_"));
}

#[tokio::test]
async fn test_closing_lobby_rejects_joins() {
    let (app, _idle) = create_test_server("*");
    let (code, _) = create_lobby(&app).await;

    let (status, body) = send(&app, "POST", &format!("/api/lobbies/{code}/close"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "closing");
    assert!(body["shuttingDownAt"].is_string());

    let uri = format!("/api/lobbies/{code}/join");
    let (status, _) = send(&app, "POST", &uri, Some(json!({ "name": "Late" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Game flow
// ============================================================================

#[tokio::test]
async fn test_start_and_submit_choices() {
    let (app, _idle) = create_test_server("*");
    let (code, host_id) = create_lobby(&app).await;
    let ari = join(&app, &code, "Ari").await;
    let _bo = join(&app, &code, "Bo").await;

    let (status, body) = send(&app, "POST", &format!("/api/lobbies/{code}/start"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["game"]["started"], true);
    assert_eq!(body["game"]["round"], 0);
    assert!(
        !body["game"]["activePlayers"]
            .as_array()
            .unwrap()
            .contains(&json!(host_id))
    );

    let choice = format!("/api/lobbies/{code}/choice");

    // Nickname fallback resolves the player
    let (status, body) = send(
        &app,
        "POST",
        &choice,
        Some(json!({ "nickname": "Ari", "choice": " RED " })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["game"]["guesses"][&ari][0], "red");

    let (status, _) = send(
        &app,
        "POST",
        &choice,
        Some(json!({ "playerId": ari, "choice": "black" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "second guess in a round");

    let (status, _) = send(
        &app,
        "POST",
        &choice,
        Some(json!({ "nickname": "Bo", "choice": "higher" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "wrong vocabulary");

    let (status, body) = send(
        &app,
        "POST",
        &choice,
        Some(json!({ "nickname": "Nobody", "choice": "red" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "player not in session");
}

#[tokio::test]
async fn test_last_choice_advances_round() {
    let (app, _idle) = create_test_server("*");
    let (code, _) = create_lobby(&app).await;
    let ari = join(&app, &code, "Ari").await;

    send(&app, "POST", &format!("/api/lobbies/{code}/start"), None).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/lobbies/{code}/choice"),
        Some(json!({ "playerId": ari, "choice": "red" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Either Ari won and moved on to round 1, or lost round 0 and is out
    if body["game"]["activePlayers"].as_array().unwrap().is_empty() {
        assert_eq!(body["players"][1]["score"], 2);
    } else {
        assert_eq!(body["game"]["round"], 1);
    }
}

#[tokio::test]
async fn test_next_requires_started_game() {
    let (app, _idle) = create_test_server("*");
    let (code, _) = create_lobby(&app).await;

    let (status, body) = send(&app, "POST", &format!("/api/lobbies/{code}/next"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "game not started");
}

#[tokio::test]
async fn test_tap_and_distribute_require_player() {
    let (app, _idle) = create_test_server("*");
    let (code, _) = create_lobby(&app).await;
    join(&app, &code, "Ari").await;

    for action in ["tap", "distribute"] {
        let uri = format!("/api/lobbies/{code}/{action}");
        let (status, body) = send(&app, "POST", &uri, Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{action}");
        assert_eq!(body["error"], "playerId required");
    }
}

#[tokio::test]
async fn test_distribute_outside_distribution_phase() {
    let (app, _idle) = create_test_server("*");
    let (code, _) = create_lobby(&app).await;
    let ari = join(&app, &code, "Ari").await;
    let bo = join(&app, &code, "Bo").await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/lobbies/{code}/distribute"),
        Some(json!({ "playerId": ari, "allocations": { bo: 2 } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "distribution not active");
}

#[tokio::test]
async fn test_tap_out_by_nickname() {
    let (app, _idle) = create_test_server("*");
    let (code, _) = create_lobby(&app).await;
    let ari = join(&app, &code, "Ari").await;
    join(&app, &code, "Bo").await;
    send(&app, "POST", &format!("/api/lobbies/{code}/start"), None).await;

    let uri = format!("/api/lobbies/{code}/tap");
    let (status, body) = send(&app, "POST", &uri, Some(json!({ "nickname": "Ari" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        body["game"]["pendingTapOutByPlayer"]
            .as_array()
            .unwrap()
            .contains(&json!(ari))
    );

    let (status, _) = send(&app, "POST", &uri, Some(json!({ "playerId": ari }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "second tap-out request");
}

// ============================================================================
// WebSocket
// ============================================================================

#[tokio::test]
async fn test_websocket_unknown_lobby_is_not_found() {
    let (app, _idle) = create_test_server("*");

    let request = Request::builder()
        .uri("/api/lobbies/NO-SUCH-LOBBY/ws")
        .header("connection", "upgrade")
        .header("upgrade", "websocket")
        .header("sec-websocket-version", "13")
        .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_websocket_requires_upgrade_for_known_lobby() {
    let (app, _idle) = create_test_server("*");
    let (code, _) = create_lobby(&app).await;

    let (status, _) = send(&app, "GET", &format!("/api/lobbies/{code}/ws"), None).await;

    assert_ne!(status, StatusCode::NOT_FOUND);
    assert!(status.is_client_error());
}
