pub mod handlers;

mod absence;
mod lobby;
mod turn;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::abuse::client_ip;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;

/// Largest inbound frame accepted from a client
pub const MAX_MESSAGE_SIZE: usize = 1_000_000;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let ip = client_ip(&headers, Some(addr));
    tracing::info!("WebSocket connection request from {}", ip);

    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, ip, state))
}

fn encode(msg: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!("Failed to serialize server message: {}", e);
            None
        }
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, ip: String, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let (conn_id, mut outbound) = state.register_connection(&ip).await;
    state.record_visitor(&ip).await;
    tracing::info!("WebSocket connected: {} ({})", conn_id, ip);

    loop {
        tokio::select! {
            // Everything queued for this connection: snapshots, prompts, errors
            queued = outbound.recv() => {
                let Some(msg) = queued else {
                    break;
                };
                if let Some(frame) = encode(&msg) {
                    if sender.send(frame).await.is_err() {
                        break;
                    }
                }
            }

            // Handle client messages
            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message: {}", text);

                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                handlers::dispatch(client_msg, &conn_id, &state).await;
                            }
                            Err(e) => {
                                // Stale or malformed client sends are dropped
                                tracing::warn!("Ignoring unparsable message from {}: {}", conn_id, e);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    state.connection_closed(&conn_id).await;
    tracing::info!("WebSocket connection closed: {}", conn_id);
}
