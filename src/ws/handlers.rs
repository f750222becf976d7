//! WebSocket message dispatch
//!
//! Every action is rate-limited per client address first, then routed to the
//! handler module for its area. Handlers return a message only for replies
//! scoped to the sender (errors, peek results); state changes reach clients
//! through the room broadcast.

use crate::error::GameError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::{AppState, Binding, SharedRoom};
use std::sync::Arc;

use super::{absence, lobby, turn};

/// The room this connection plays in. Expired rooms are torn down here and
/// reported to their clients, so callers just see `None`.
pub(super) async fn bound_room(state: &AppState, conn_id: &str) -> Option<(Binding, SharedRoom)> {
    let binding = state.binding_of(conn_id).await?;
    let shared = state.get_room(&binding.room_code).await?;
    Some((binding, shared))
}

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    conn_id: &str,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    let ip = state.connection_ip(conn_id).await;
    let action = msg.action();
    if !state.abuse.allow(&ip, action).await {
        tracing::warn!("Rate limited {} from {}", action, ip);
        // Peeks are polled; excess ones are simply dropped
        if matches!(msg, ClientMessage::RoomPeek { .. }) {
            return None;
        }
        return Some(GameError::RateLimited.into());
    }

    match msg {
        // Lobby and membership
        ClientMessage::RoomCreate { name, theme } => {
            lobby::handle_create(state, conn_id, name, theme).await
        }
        ClientMessage::RoomJoin { code, name } => {
            lobby::handle_join(state, conn_id, code, name).await
        }
        ClientMessage::RoomLeave => lobby::handle_leave(state, conn_id).await,
        ClientMessage::RoomPeek { code } => lobby::handle_peek(state, code).await,
        ClientMessage::RoomResume { code, player_id } => {
            lobby::handle_resume(state, conn_id, code, player_id).await
        }
        ClientMessage::PlayerUpdate { name, color } => {
            lobby::handle_update(state, conn_id, name, color).await
        }

        // Game flow
        ClientMessage::ThemeFinalize { theme } => {
            turn::handle_finalize(state, conn_id, theme).await
        }
        ClientMessage::GameResume => turn::handle_game_resume(state, conn_id).await,
        ClientMessage::SelectDare { index } => {
            turn::handle_select(state, conn_id, index).await
        }
        ClientMessage::Submit { response } => {
            turn::handle_submit(state, conn_id, response).await
        }
        ClientMessage::Pass => turn::handle_pass(state, conn_id).await,
        ClientMessage::Complete {
            completed_most_daring,
        } => turn::handle_complete(state, conn_id, completed_most_daring).await,
        ClientMessage::AddDare { title, extra } => {
            turn::handle_add_dare(state, conn_id, title, extra).await
        }

        // Absence protocol
        ClientMessage::IdleEscalate => absence::handle_idle_escalate(state, conn_id).await,
        ClientMessage::AbsentResponse {
            prompt_id,
            target_id,
            present,
        } => absence::handle_absent_response(state, conn_id, prompt_id, target_id, present).await,
    }
}

/// Handle a client message and queue any direct reply behind the frames
/// already waiting for this connection, so it never overtakes a broadcast.
pub async fn dispatch(msg: ClientMessage, conn_id: &str, state: &Arc<AppState>) {
    if let Some(reply) = handle_message(msg, conn_id, state).await {
        state.send_to(conn_id, reply).await;
    }
}
