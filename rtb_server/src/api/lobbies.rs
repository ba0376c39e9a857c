//! Lobby endpoints.
//!
//! Request bodies are decoded leniently: a missing or malformed body reads as
//! all-defaults and the lobby layer reports what is actually missing.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use rand::{Rng, distr::Alphanumeric};
use ride_the_bus::{GameError, PlayerId, Session, StoreError, session::StoreResult};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::HashMap;

use super::{ApiResult, AppState, bad_request, store_error};
use crate::{logging, metrics};

/// Length of the random suffix in generated host names
pub const HOST_NAME_SUFFIX_LEN: usize = 16;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLobbyResponse {
    pub host_id: PlayerId,
    pub session: Session,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct JoinRequest {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub player_id: PlayerId,
    pub session: Session,
}

/// Identifies the acting player by id, or by display name
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerRequest {
    pub player_id: Option<String>,
    pub nickname: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChoiceRequest {
    pub player_id: Option<String>,
    pub nickname: Option<String>,
    pub choice: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DistributeRequest {
    pub player_id: Option<String>,
    pub nickname: Option<String>,
    pub allocations: HashMap<PlayerId, i64>,
}

/// `Host_` followed by random alphanumerics
pub fn generate_host_name() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(HOST_NAME_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("Host_{suffix}")
}

fn lenient<T: DeserializeOwned + Default>(body: &Bytes) -> T {
    serde_json::from_slice(body).unwrap_or_default()
}

/// Count and log the outcome, then convert the error for the client
fn finish<T>(operation: &'static str, code: &str, result: StoreResult<T>) -> ApiResult<T> {
    metrics::lobby_operations_total(operation, result.is_ok());
    match result {
        Ok(value) => {
            logging::log_lobby_operation(operation, code, Ok(()));
            Ok(value)
        }
        Err(e) => {
            logging::log_lobby_operation(operation, code, Err(&e.to_string()));
            Err(store_error(e))
        }
    }
}

async fn resolve(
    state: &AppState,
    code: &str,
    player_id: Option<&str>,
    nickname: Option<&str>,
) -> ApiResult<Option<PlayerId>> {
    state
        .service
        .resolve_player(code, player_id, nickname)
        .await
        .map_err(store_error)
}

/// `POST /api/lobbies`
pub async fn create_lobby(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<CreateLobbyResponse>)> {
    let result = state.service.create_session(&generate_host_name()).await;
    metrics::lobby_operations_total("create", result.is_ok());
    let (session, host) = result.map_err(store_error)?;

    Ok((
        StatusCode::CREATED,
        Json(CreateLobbyResponse {
            host_id: host.id,
            session,
        }),
    ))
}

/// `GET /api/lobbies/{code}`
pub async fn get_lobby(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<Session>> {
    state
        .service
        .get(&code)
        .await
        .map(Json)
        .map_err(store_error)
}

/// `POST /api/lobbies/{code}/join`
pub async fn join_lobby(
    State(state): State<AppState>,
    Path(code): Path<String>,
    body: Bytes,
) -> ApiResult<Json<JoinResponse>> {
    let request: JoinRequest = lenient(&body);
    let result = state.service.join(&code, &request.name).await;
    let (player, session) = finish("join", &code, result)?;

    Ok(Json(JoinResponse {
        player_id: player.id,
        session,
    }))
}

/// `POST /api/lobbies/{code}/close`
pub async fn close_lobby(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<Session>> {
    let result = state.service.close(&code, state.close_grace).await;
    finish("close", &code, result).map(Json)
}

/// `POST /api/lobbies/{code}/start`
pub async fn start_game(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<Session>> {
    let result = state.service.start(&code).await;
    finish("start", &code, result).map(Json)
}

/// `POST /api/lobbies/{code}/choice`
pub async fn submit_choice(
    State(state): State<AppState>,
    Path(code): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Session>> {
    let request: ChoiceRequest = lenient(&body);
    let player_id = resolve(
        &state,
        &code,
        request.player_id.as_deref(),
        request.nickname.as_deref(),
    )
    .await?;

    let result = match player_id {
        Some(player_id) => {
            state
                .service
                .submit_guess(&code, &player_id, &request.choice)
                .await
        }
        None => Err(StoreError::Game(GameError::UnknownPlayer)),
    };
    finish("choice", &code, result).map(Json)
}

/// `POST /api/lobbies/{code}/next`
pub async fn next_round(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<Session>> {
    let result = state.service.advance_round(&code).await;
    finish("next", &code, result).map(Json)
}

/// `POST /api/lobbies/{code}/distribute`
pub async fn distribute(
    State(state): State<AppState>,
    Path(code): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Session>> {
    let request: DistributeRequest = lenient(&body);
    let Some(player_id) = resolve(
        &state,
        &code,
        request.player_id.as_deref(),
        request.nickname.as_deref(),
    )
    .await?
    else {
        return Err(bad_request("playerId required"));
    };

    let result = state
        .service
        .distribute(&code, &player_id, &request.allocations)
        .await;
    finish("distribute", &code, result).map(Json)
}

/// `POST /api/lobbies/{code}/tap`
pub async fn tap_out(
    State(state): State<AppState>,
    Path(code): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Session>> {
    let request: PlayerRequest = lenient(&body);
    let Some(player_id) = resolve(
        &state,
        &code,
        request.player_id.as_deref(),
        request.nickname.as_deref(),
    )
    .await?
    else {
        return Err(bad_request("playerId required"));
    };

    let result = state.service.tap_out(&code, &player_id).await;
    finish("tap", &code, result).map(Json)
}
