//! WebSocket handler for realtime lobby snapshots.
//!
//! # Connection Flow
//!
//! 1. Client connects via `GET /api/lobbies/{code}/ws`; unknown lobbies get
//!    `404` before the upgrade
//! 2. The connection joins the lobby's room and the current snapshot is
//!    pushed to the whole room
//! 3. Every later mutation arrives as `{"type":"session","session":{..}}`
//! 4. Client frames are read only to notice the close; the room forgets the
//!    connection when the socket ends or falls too far behind
//!
//! ```javascript
//! const ws = new WebSocket('ws://localhost:3000/api/lobbies/BRAVE-OTTER-JUMPS/ws');
//! ws.onmessage = (event) => render(JSON.parse(event.data).session);
//! ```

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use ride_the_bus::session::normalize_code;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{AppState, store_error};
use crate::metrics;

static ACTIVE_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

/// Upgrade to a WebSocket subscribed to one lobby's snapshots.
///
/// The lobby is checked before the upgrade headers, so an unknown code is
/// always `404`.
pub async fn websocket_handler(
    Path(code): Path<String>,
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if let Err(e) = state.service.get(&code).await {
        return store_error(e).into_response();
    }

    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(socket, normalize_code(&code), state)),
        Err(rejection) => rejection.into_response(),
    }
}

async fn handle_socket(socket: WebSocket, code: String, state: AppState) {
    let (connection_id, mut updates) = match state.service.connect(&code).await {
        Ok(connection) => connection,
        Err(e) => {
            warn!("Lobby {code} vanished before the WebSocket joined: {e}");
            return;
        }
    };

    let active = ACTIVE_CONNECTIONS.fetch_add(1, Ordering::Relaxed) + 1;
    metrics::websocket_connections_active(active);
    metrics::websocket_connections_total();
    info!("WebSocket {connection_id} joined lobby {code}");

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(payload) = updates.recv().await {
            if sender
                .send(Message::Text(payload.to_string().into()))
                .await
                .is_err()
            {
                break;
            }
            metrics::websocket_messages_sent();
        }
        let _ = sender.close().await;
    });

    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("WebSocket {connection_id} read error in lobby {code}: {e}");
                    break;
                }
            },
            // the room dropped this connection or the socket stopped accepting writes
            _ = &mut send_task => break,
        }
    }

    send_task.abort();
    state.service.disconnect(&code, connection_id).await;

    let active = ACTIVE_CONNECTIONS
        .fetch_sub(1, Ordering::Relaxed)
        .saturating_sub(1);
    metrics::websocket_connections_active(active);
    info!("WebSocket {connection_id} left lobby {code}");
}
