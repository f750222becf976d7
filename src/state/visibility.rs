//! Per-recipient room snapshots.
//!
//! The active player sees every response; everyone else sees their own
//! response and a presence-only placeholder for the rest.

use crate::protocol::{RoomView, SubmissionView, TurnView};
use crate::types::*;

/// Build the snapshot `viewer` is allowed to see. `None` is an anonymous
/// viewer (room preview) and only gets placeholders.
pub fn project(room: &Room, viewer: Option<&str>) -> RoomView {
    let turn = room.turn.as_ref().map(|turn| project_turn(turn, viewer));

    RoomView {
        code: room.code.clone(),
        state: room.phase,
        paused: room.paused,
        host_id: room.host_id.clone(),
        players: room.players.clone(),
        chosen_theme: room.chosen_theme.clone(),
        dare_menu: room.menu.clone(),
        turn,
        created_at: room.created_at,
    }
}

fn project_turn(turn: &Turn, viewer: Option<&str>) -> TurnView {
    let active = turn.active_id().map(String::as_str);
    let sees_all = viewer.is_some() && viewer == active;

    let submissions = turn
        .submissions()
        .iter()
        .map(|s| {
            if sees_all || viewer == Some(s.player_id.as_str()) {
                SubmissionView::full(s)
            } else {
                SubmissionView::placeholder(s)
            }
        })
        .collect();

    TurnView {
        order: turn.order.clone(),
        index: turn.index,
        selected_dare_index: turn.selected(),
        submissions,
        status: turn.status(),
        adding_by: turn.adding_by().cloned(),
    }
}
