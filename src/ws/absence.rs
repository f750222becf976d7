use crate::protocol::ServerMessage;
use crate::state::AppState;
use std::sync::Arc;

use super::handlers::bound_room;

/// The active player's own client reports it has gone idle
pub async fn handle_idle_escalate(state: &Arc<AppState>, conn_id: &str) -> Option<ServerMessage> {
    let (binding, shared) = bound_room(state, conn_id).await?;
    let mut room = shared.lock().await;
    if !state.escalate_idle(&mut room, &binding.player_id).await {
        tracing::debug!(
            "Idle escalation from {} ignored in room {}",
            binding.player_id,
            room.code
        );
    }
    None
}

/// Someone in the room answered "is this player still playing?"
pub async fn handle_absent_response(
    state: &Arc<AppState>,
    conn_id: &str,
    prompt_id: String,
    target_id: String,
    present: bool,
) -> Option<ServerMessage> {
    let (binding, shared) = bound_room(state, conn_id).await?;
    let mut room = shared.lock().await;
    let applied = state
        .answer_absent_prompt(&mut room, &binding.player_id, &prompt_id, &target_id, present)
        .await;
    if !applied {
        tracing::debug!("Stale absent answer {} in room {}", prompt_id, room.code);
    }
    None
}
