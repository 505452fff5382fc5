//! WebSocket relay: streams one game's integration events to a client.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use crate::api::{parse_code, ApiState};
use crate::events::IntegrationEvent;
use crate::protocol::{GameDetails, RelayFrame};
use crate::types::GameCode;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub code: String,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<ApiState>,
) -> Response {
    let code = match parse_code(&params.code) {
        Ok(code) => code,
        Err(e) => return e.into_response(),
    };
    // Refuse the upgrade for unknown games
    let snapshot = match state.engine.get_game_details(&code).await {
        Ok(details) => details,
        Err(e) => return e.into_response(),
    };

    tracing::info!(code = %code, "WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, code, snapshot, state))
}

async fn handle_socket(socket: WebSocket, code: GameCode, snapshot: GameDetails, state: ApiState) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before sending the snapshot so nothing falls in between
    let mut events = state.relay.subscribe();

    if let Ok(json) = serde_json::to_string(&RelayFrame::Snapshot { game: snapshot }) {
        if sender.send(Message::Text(json.into())).await.is_err() {
            tracing::error!(code = %code, "Failed to send snapshot");
            return;
        }
    }

    loop {
        tokio::select! {
            received = events.recv() => {
                let envelope = match received {
                    Ok(envelope) => envelope,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(code = %code, skipped, "WebSocket client lagging, events dropped");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if envelope.game_code != code {
                    continue;
                }

                let deleted = envelope.event == IntegrationEvent::GameDeleted;
                if let Ok(json) = serde_json::to_string(&RelayFrame::Event { envelope }) {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                if deleted {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!(code = %code, "WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    // Clients act through the HTTP API; anything else is ignored
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(code = %code, error = %e, "WebSocket error");
                        break;
                    }
                }
            }
        }
    }
}
