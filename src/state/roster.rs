use super::AppState;
use crate::types::*;
use rand::Rng;

/// Player ids are lowercase alphanumerics, long enough to be unguessable
const ID_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ID_LENGTH: usize = 16;

pub fn generate_player_id() -> PlayerId {
    let mut rng = rand::rng();
    (0..ID_LENGTH)
        .map(|_| ID_CHARS[rng.random_range(0..ID_CHARS.len())] as char)
        .collect()
}

/// Strip control characters, trim and cap at `max_chars` characters
pub fn sanitize_text(raw: &str, max_chars: usize) -> String {
    raw.chars()
        .filter(|c| !c.is_ascii_control())
        .collect::<String>()
        .trim()
        .chars()
        .take(max_chars)
        .collect()
}

fn display_name(raw: &str) -> String {
    let name = sanitize_text(raw, MAX_NAME_CHARS);
    if name.is_empty() {
        DEFAULT_PLAYER_NAME.to_string()
    } else {
        name
    }
}

impl Room {
    /// First palette colour nobody in the room currently holds
    pub fn next_color(&self) -> Option<String> {
        PALETTE
            .iter()
            .find(|c| !self.players.iter().any(|p| p.color.as_deref() == Some(**c)))
            .map(|c| c.to_string())
    }

    pub fn used_colors(&self) -> Vec<String> {
        self.players.iter().filter_map(|p| p.color.clone()).collect()
    }

    /// Add a connected player. The first player becomes host; mid-game joiners
    /// enter rotation right after the active player.
    pub fn add_player(&mut self, raw_name: &str) -> Player {
        let player = Player {
            id: generate_player_id(),
            name: display_name(raw_name),
            color: self.next_color(),
            connected: true,
        };
        self.players.push(player.clone());

        if self.host_id.is_none() {
            self.host_id = Some(player.id.clone());
        }

        if self.phase == RoomPhase::Main {
            if let Some(turn) = self.turn.as_mut() {
                turn.insert_after_active(&player.id);
            }
        }

        player
    }

    /// Remove a player from roster and rotation, reassigning host if needed
    pub fn remove_player(&mut self, player_id: &str) -> Option<Player> {
        let pos = self.players.iter().position(|p| p.id == player_id)?;
        let player = self.players.remove(pos);

        if self.host_id.as_deref() == Some(player_id) {
            self.host_id = self.players.first().map(|p| p.id.clone());
        }

        if let Some(turn) = self.turn.as_mut() {
            let effect = turn.remove_player(player_id);
            if effect.was_active || effect.was_author {
                tracing::info!(
                    "Active player removed in room {}, turn resets at index {}",
                    self.code,
                    turn.index
                );
            }
        }

        Some(player)
    }

    /// Apply a name and/or colour change. Colours must come from the palette
    /// and not be held by anyone else.
    pub fn update_player(
        &mut self,
        player_id: &str,
        name: Option<&str>,
        color: Option<&str>,
    ) -> bool {
        let color_free = color.is_some_and(|c| {
            PALETTE.contains(&c)
                && !self
                    .players
                    .iter()
                    .any(|p| p.id != player_id && p.color.as_deref() == Some(c))
        });

        let Some(player) = self.player_mut(player_id) else {
            return false;
        };
        let mut changed = false;
        if let Some(name) = name {
            player.name = display_name(name);
            changed = true;
        }
        if let (Some(color), true) = (color, color_free) {
            player.color = Some(color.to_string());
            changed = true;
        }
        changed
    }

    /// Players who joined while the room was paused get slotted in on resume
    pub fn reconcile_turn_order(&mut self) {
        let Some(turn) = self.turn.as_mut() else {
            return;
        };
        let missing: Vec<PlayerId> = self
            .players
            .iter()
            .filter(|p| !turn.order.contains(&p.id))
            .map(|p| p.id.clone())
            .collect();
        for id in missing.iter().rev() {
            turn.insert_after_active(id);
        }
    }

    /// Drop back to a paused lobby when too few players are connected.
    /// Returns true if the room was paused by this call.
    pub fn apply_player_count_guard(&mut self) -> bool {
        let connected = self.connected_count();
        if self.phase == RoomPhase::Main && connected < MIN_CONNECTED_PLAYERS {
            self.phase = RoomPhase::Lobby;
            self.paused = true;
            tracing::info!(
                "Room {} paused due to insufficient players ({})",
                self.code,
                connected
            );
            return true;
        }
        false
    }
}

impl AppState {
    /// Shared removal path for explicit leave and absence-confirmed removal:
    /// roster, rotation, pending timers and any sockets still bound to the
    /// player.
    pub async fn remove_member(&self, room: &mut Room, player_id: &str) -> Option<Player> {
        self.cancel_pending_disconnect(player_id).await;

        let player = room.remove_player(player_id)?;

        let targeted = room
            .absence
            .as_ref()
            .is_some_and(|a| a.target_id == player_id);
        if targeted {
            self.clear_absence(room, true).await;
        }

        self.unbind_player(&room.code, player_id).await;
        tracing::info!("Removed player {} from room {}", player.name, room.code);
        Some(player)
    }

    /// Run the player-count guard; pausing cancels any absence prompt
    pub async fn enforce_player_count(&self, room: &mut Room) -> bool {
        let paused = room.apply_player_count_guard();
        if paused {
            self.clear_absence(room, true).await;
        }
        paused
    }
}
