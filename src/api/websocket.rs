use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tracing::{error, info};

use crate::api::state::AppState;

/// WebSocket handler for board observers
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (observer, mut outbound) = state.hub.connect().await;

    // Drain this observer's outbound queue into the socket. The queue closes
    // when the hub evicts the observer.
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            let json = match msg.to_json() {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize WebSocket message: {}", e);
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    let hub = state.hub.clone();
    let id = observer.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => hub.handle_text(&id, &text).await,
                Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                    Ok(text) => hub.handle_text(&id, text).await,
                    Err(_) => {
                        hub.touch(&id).await;
                    }
                },
                Message::Ping(_) | Message::Pong(_) => {
                    // Axum answers pings; the frame still counts as activity
                    hub.touch(&id).await;
                }
                Message::Close(_) => break,
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.hub.disconnect(&observer).await;
    info!(observer = %observer, "WebSocket connection closed");
}
