//! Game start/resume and the per-turn actions.
//!
//! Out-of-state requests are dropped without a reply; the next room
//! broadcast brings the client back in sync.

use chrono::Utc;
use std::sync::Arc;

use crate::content::DEFAULT_THEME;
use crate::protocol::ServerMessage;
use crate::state::{sanitize_text, AppState};
use crate::types::*;

use super::handlers::bound_room;

/// Start the game from the lobby, seeding the menu from server-side content
pub async fn handle_finalize(
    state: &Arc<AppState>,
    conn_id: &str,
    theme: Option<String>,
) -> Option<ServerMessage> {
    let (binding, shared) = bound_room(state, conn_id).await?;
    let mut room = shared.lock().await;

    if room.phase != RoomPhase::Lobby {
        tracing::warn!("Start rejected in room {}: not in lobby", room.code);
        return None;
    }
    let connected = room.connected_count();
    if connected < MIN_CONNECTED_PLAYERS {
        tracing::warn!(
            "Start rejected in room {}: {} connected players",
            room.code,
            connected
        );
        return None;
    }

    // Creator's stored preference, then the lobby choice, then the request
    let content = &state.content;
    let mut key = content
        .resolve(room.preferred_theme.as_deref())
        .or_else(|| content.resolve(room.chosen_theme.as_deref()))
        .or_else(|| content.resolve(theme.as_deref()))
        .or_else(|| content.default_key())
        .unwrap_or(DEFAULT_THEME)
        .to_string();
    if content.seed(&key).is_empty() {
        if let Some(fallback) = content.resolve(Some(DEFAULT_THEME)) {
            key = fallback.to_string();
        }
    }

    let now = Utc::now();
    room.menu = content
        .seed(&key)
        .iter()
        .take(MAX_MENU_ENTRIES)
        .map(|d| DareEntry {
            title: d.title.clone(),
            extra: d.extra.clone(),
            created_by: None,
            created_at: now,
        })
        .collect();
    room.chosen_theme = Some(key.clone());
    room.phase = RoomPhase::Main;
    room.paused = false;
    let order = room.players.iter().map(|p| p.id.clone()).collect();
    room.turn = Some(Turn::new(order));

    state
        .stats
        .write()
        .await
        .record_game_started(&room.code, &key);
    tracing::info!(
        "Game started in room {} by {} (theme {}, {} dares, {} connected)",
        room.code,
        room.player_name(&binding.player_id),
        key,
        room.menu.len(),
        connected
    );

    room.touch();
    state.focus_turn(&mut room).await;
    state.broadcast_room_state(&room).await;
    None
}

/// Continue a paused game once enough players are back
pub async fn handle_game_resume(state: &Arc<AppState>, conn_id: &str) -> Option<ServerMessage> {
    let (binding, shared) = bound_room(state, conn_id).await?;
    let mut room = shared.lock().await;

    if !room.paused || room.turn.is_none() {
        return None;
    }
    let connected = room.connected_count();
    if connected < MIN_CONNECTED_PLAYERS {
        tracing::warn!(
            "Resume rejected in room {}: {} connected players",
            room.code,
            connected
        );
        return None;
    }

    room.reconcile_turn_order();
    room.phase = RoomPhase::Main;
    room.paused = false;
    tracing::info!(
        "Game resumed in room {} by {}",
        room.code,
        room.player_name(&binding.player_id)
    );

    room.touch();
    state.focus_turn(&mut room).await;
    state.broadcast_room_state(&room).await;
    None
}

pub async fn handle_select(
    state: &Arc<AppState>,
    conn_id: &str,
    index: usize,
) -> Option<ServerMessage> {
    let (binding, shared) = bound_room(state, conn_id).await?;
    let mut guard = shared.lock().await;
    let room = &mut *guard;
    if room.phase != RoomPhase::Main {
        return None;
    }

    let menu_len = room.menu.len();
    if !room.turn.as_mut()?.select(index, menu_len) {
        return None;
    }

    let title = room
        .menu
        .get(index)
        .map(|d| d.title.clone())
        .unwrap_or_default();
    state
        .log_event(
            &room.code,
            "select",
            format!(
                "{} proposed dare: {}",
                room.player_name(&binding.player_id),
                title
            ),
        )
        .await;

    room.touch();
    state.broadcast_room_state(room).await;
    None
}

pub async fn handle_submit(
    state: &Arc<AppState>,
    conn_id: &str,
    response: ResponseKind,
) -> Option<ServerMessage> {
    let (binding, shared) = bound_room(state, conn_id).await?;
    let mut room = shared.lock().await;
    if room.phase != RoomPhase::Main {
        return None;
    }

    if !room
        .turn
        .as_mut()?
        .submit(&binding.player_id, response, Utc::now())
    {
        return None;
    }

    state
        .log_event(
            &room.code,
            "respond",
            format!(
                "{} responded {}",
                room.player_name(&binding.player_id),
                response.as_str()
            ),
        )
        .await;

    room.touch();
    state.broadcast_room_state(&room).await;
    None
}

pub async fn handle_pass(state: &Arc<AppState>, conn_id: &str) -> Option<ServerMessage> {
    let (binding, shared) = bound_room(state, conn_id).await?;
    let mut room = shared.lock().await;
    if room.phase != RoomPhase::Main {
        return None;
    }

    let title = room
        .turn
        .as_ref()?
        .selected()
        .and_then(|i| room.menu.get(i))
        .map(|d| d.title.clone());
    if !room.turn.as_mut()?.pass() {
        return None;
    }

    let who = room.player_name(&binding.player_id);
    let message = match title {
        Some(title) => format!("{} passed on: {}", who, title),
        None => format!("{} passed", who),
    };
    state.log_event(&room.code, "pass", message).await;

    room.touch();
    state.focus_turn(&mut room).await;
    state.broadcast_room_state(&room).await;
    None
}

pub async fn handle_complete(
    state: &Arc<AppState>,
    conn_id: &str,
    completed_most_daring: bool,
) -> Option<ServerMessage> {
    let (binding, shared) = bound_room(state, conn_id).await?;
    let mut guard = shared.lock().await;
    let room = &mut *guard;
    if room.phase != RoomPhase::Main {
        return None;
    }

    let turn = room.turn.as_mut()?;
    let before = turn.index;
    if !turn.complete(completed_most_daring) {
        return None;
    }
    tracing::debug!(
        "Turn completed in room {}: index {} -> {} ({:?})",
        room.code,
        before,
        turn.index,
        turn.status()
    );

    let suffix = if completed_most_daring {
        " (most daring)"
    } else {
        ""
    };
    state
        .log_event(
            &room.code,
            "complete",
            format!(
                "{} confirmed completion{}",
                room.player_name(&binding.player_id),
                suffix
            ),
        )
        .await;

    room.touch();
    state.focus_turn(room).await;
    state.broadcast_room_state(room).await;
    None
}

/// New menu entry from the player holding the authoring window
pub async fn handle_add_dare(
    state: &Arc<AppState>,
    conn_id: &str,
    title: String,
    extra: String,
) -> Option<ServerMessage> {
    let (binding, shared) = bound_room(state, conn_id).await?;
    let mut guard = shared.lock().await;
    let room = &mut *guard;
    if room.phase != RoomPhase::Main {
        return None;
    }

    let title = sanitize_text(&title, MAX_DARE_TITLE_CHARS);
    let extra = sanitize_text(&extra, MAX_DARE_EXTRA_CHARS);
    if title.is_empty() || extra.is_empty() {
        return None;
    }

    let entry = DareEntry {
        title: title.clone(),
        extra: extra.clone(),
        created_by: Some(binding.player_id.clone()),
        created_at: Utc::now(),
    };
    let turn = room.turn.as_mut()?;
    match turn.add_dare(&binding.player_id, entry, &mut room.menu) {
        Ok(true) => {}
        Ok(false) => return None,
        Err(e) => {
            tracing::warn!("Add dare rejected in room {}: {}", room.code, e);
            return Some(e.into());
        }
    }

    state
        .log_event(
            &room.code,
            "add-dare",
            format!(
                "{} added dare: {} (extra: {})",
                room.player_name(&binding.player_id),
                title,
                extra
            ),
        )
        .await;

    room.touch();
    state.focus_turn(room).await;
    state.broadcast_room_state(room).await;
    None
}
