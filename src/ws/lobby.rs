//! Room membership: create, join, leave, peek, resume and profile updates

use crate::error::GameError;
use crate::protocol::ServerMessage;
use crate::state::{visibility, AppState};
use crate::types::RoomPhase;
use std::sync::Arc;

use super::handlers::bound_room;

pub async fn handle_create(
    state: &Arc<AppState>,
    conn_id: &str,
    name: String,
    theme: Option<String>,
) -> Option<ServerMessage> {
    let shared = state.create_room().await;
    let mut room = shared.lock().await;
    let player = room.add_player(&name);

    // The creator's theme is shown in the lobby and used when the game starts
    let preferred = state
        .content
        .resolve(theme.as_deref())
        .or_else(|| state.content.default_key())
        .map(str::to_string);
    match &preferred {
        Some(key) => tracing::info!(
            "Room {} theme preference {} (requested {:?})",
            room.code,
            key,
            theme
        ),
        None => tracing::warn!("Room {} has no theme to prefer", room.code),
    }
    room.preferred_theme = preferred.clone();
    room.chosen_theme = preferred;

    state.bind(conn_id, &room.code, &player.id).await;
    state
        .send_to(
            conn_id,
            ServerMessage::PlayerYou {
                player_id: player.id.clone(),
            },
        )
        .await;
    state
        .stats
        .write()
        .await
        .record_room_created(&room.code, &player.name);

    tracing::info!("Room {} created by {}", room.code, player.name);
    room.touch();
    state.broadcast_room_state(&room).await;
    None
}

pub async fn handle_join(
    state: &Arc<AppState>,
    conn_id: &str,
    code: String,
    name: String,
) -> Option<ServerMessage> {
    let Some(shared) = state.get_room(&code).await else {
        return Some(GameError::NoSuchRoom.into());
    };
    let mut room = shared.lock().await;
    let player = room.add_player(&name);

    state.bind(conn_id, &room.code, &player.id).await;
    state
        .send_to(
            conn_id,
            ServerMessage::PlayerYou {
                player_id: player.id.clone(),
            },
        )
        .await;
    state
        .log_event(&room.code, "join", format!("{} joined the room", player.name))
        .await;

    tracing::info!("{} joined room {}", player.name, room.code);
    room.touch();
    state.broadcast_room_state(&room).await;
    None
}

pub async fn handle_leave(state: &Arc<AppState>, conn_id: &str) -> Option<ServerMessage> {
    let (binding, shared) = bound_room(state, conn_id).await?;
    let mut room = shared.lock().await;

    let removed = state.remove_member(&mut room, &binding.player_id).await;
    state.unbind(conn_id).await;
    let player = removed?;

    state
        .log_event(&room.code, "leave", format!("{} left the room", player.name))
        .await;

    let paused = state.enforce_player_count(&mut room).await;
    room.touch();
    if !paused && room.phase == RoomPhase::Main {
        state.focus_turn(&mut room).await;
    }
    state.broadcast_room_state(&room).await;
    None
}

/// Read-only preview for the join screen. Responses are always redacted.
pub async fn handle_peek(state: &Arc<AppState>, code: String) -> Option<ServerMessage> {
    let Some(shared) = state.get_room(&code).await else {
        return Some(ServerMessage::PeekResult {
            ok: false,
            state: None,
            used_colors: Vec::new(),
        });
    };
    let room = shared.lock().await;
    Some(ServerMessage::PeekResult {
        ok: true,
        state: Some(visibility::project(&room, None)),
        used_colors: room.used_colors(),
    })
}

pub async fn handle_resume(
    state: &Arc<AppState>,
    conn_id: &str,
    code: String,
    player_id: String,
) -> Option<ServerMessage> {
    let Some(shared) = state.get_room(&code).await else {
        return Some(GameError::NoSuchRoom.into());
    };
    let mut room = shared.lock().await;
    if !state.resume_player(&mut room, conn_id, &player_id).await {
        tracing::debug!("Resume for unknown player {} in room {}", player_id, room.code);
        return None;
    }

    state
        .send_to(conn_id, ServerMessage::PlayerYou { player_id })
        .await;
    room.touch();
    state.broadcast_room_state(&room).await;
    None
}

pub async fn handle_update(
    state: &Arc<AppState>,
    conn_id: &str,
    name: Option<String>,
    color: Option<String>,
) -> Option<ServerMessage> {
    let (binding, shared) = bound_room(state, conn_id).await?;
    let mut room = shared.lock().await;
    if !room.update_player(&binding.player_id, name.as_deref(), color.as_deref()) {
        return None;
    }
    room.touch();
    state.broadcast_room_state(&room).await;
    None
}
