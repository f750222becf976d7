//! Socket connections and their binding to a (room, player).
//!
//! Each websocket gets an outbound mpsc channel; everything the server sends
//! goes through it so a connection sees messages in the order they were
//! produced. A closed socket only marks its player disconnected after a short
//! grace period, so a page refresh that resumes quickly goes unnoticed.

use super::{visibility, AppState, PendingDisconnect};
use crate::protocol::ServerMessage;
use crate::types::*;
use tokio::sync::mpsc;
use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub room_code: RoomCode,
    pub player_id: PlayerId,
}

#[derive(Debug)]
pub struct Connection {
    pub ip: String,
    pub tx: mpsc::UnboundedSender<ServerMessage>,
    pub binding: Option<Binding>,
}

impl AppState {
    /// Register a new socket, returning its id and the receiving end of its
    /// outbound queue
    pub async fn register_connection(
        &self,
        ip: &str,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Ulid::new().to_string();
        self.connections.write().await.insert(
            id.clone(),
            Connection {
                ip: ip.to_string(),
                tx,
                binding: None,
            },
        );
        (id, rx)
    }

    pub async fn bind(&self, conn_id: &str, room_code: &str, player_id: &str) {
        if let Some(conn) = self.connections.write().await.get_mut(conn_id) {
            conn.binding = Some(Binding {
                room_code: room_code.to_string(),
                player_id: player_id.to_string(),
            });
        }
    }

    pub async fn unbind(&self, conn_id: &str) -> Option<Binding> {
        self.connections
            .write()
            .await
            .get_mut(conn_id)
            .and_then(|conn| conn.binding.take())
    }

    /// Detach every socket bound to a removed player
    pub async fn unbind_player(&self, room_code: &str, player_id: &str) {
        for conn in self.connections.write().await.values_mut() {
            let matches = conn
                .binding
                .as_ref()
                .is_some_and(|b| b.room_code == room_code && b.player_id == player_id);
            if matches {
                conn.binding = None;
            }
        }
    }

    pub async fn binding_of(&self, conn_id: &str) -> Option<Binding> {
        self.connections
            .read()
            .await
            .get(conn_id)
            .and_then(|conn| conn.binding.clone())
    }

    pub async fn connection_ip(&self, conn_id: &str) -> String {
        self.connections
            .read()
            .await
            .get(conn_id)
            .map(|conn| conn.ip.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn send_to(&self, conn_id: &str, msg: ServerMessage) {
        if let Some(conn) = self.connections.read().await.get(conn_id) {
            // A closed receiver means the socket task is shutting down
            let _ = conn.tx.send(msg);
        }
    }

    /// Same message to every socket bound to the room
    pub async fn send_to_room(&self, room_code: &str, msg: ServerMessage) {
        for conn in self.connections.read().await.values() {
            if conn
                .binding
                .as_ref()
                .is_some_and(|b| b.room_code == room_code)
            {
                let _ = conn.tx.send(msg.clone());
            }
        }
    }

    /// Push a tailored snapshot to every socket bound to the room
    pub async fn broadcast_room_state(&self, room: &Room) {
        let connections = self.connections.read().await;
        let mut sent = 0;
        for conn in connections.values() {
            let Some(binding) = conn.binding.as_ref() else {
                continue;
            };
            if binding.room_code != room.code {
                continue;
            }
            let view = visibility::project(room, Some(&binding.player_id));
            if conn.tx.send(ServerMessage::RoomState(view)).is_ok() {
                sent += 1;
            }
        }
        tracing::debug!("Room {} state sent to {} connections", room.code, sent);
    }

    async fn player_has_connection(&self, room_code: &str, player_id: &str) -> bool {
        self.connections.read().await.values().any(|conn| {
            conn.binding
                .as_ref()
                .is_some_and(|b| b.room_code == room_code && b.player_id == player_id)
        })
    }

    /// Socket closed. A bound player is marked disconnected after the grace
    /// period unless they come back first.
    pub async fn connection_closed(&self, conn_id: &str) {
        let Some(conn) = self.connections.write().await.remove(conn_id) else {
            return;
        };
        let Some(binding) = conn.binding else {
            return;
        };

        let token = Ulid::new();
        let state = self.clone();
        let grace = self.timing.disconnect_grace;
        let handle = {
            let binding = binding.clone();
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                state
                    .finish_disconnect(&binding.room_code, &binding.player_id, token)
                    .await;
            })
        };

        let previous = self
            .pending_disconnects
            .lock()
            .await
            .insert(binding.player_id.clone(), PendingDisconnect { token, handle });
        if let Some(previous) = previous {
            previous.handle.abort();
        }
        tracing::debug!(
            "Connection {} closed, player {} pending disconnect",
            conn_id,
            binding.player_id
        );
    }

    /// Forget a scheduled disconnect mark (resume, leave or removal)
    pub async fn cancel_pending_disconnect(&self, player_id: &str) {
        if let Some(pending) = self.pending_disconnects.lock().await.remove(player_id) {
            pending.handle.abort();
        }
    }

    async fn finish_disconnect(&self, room_code: &str, player_id: &str, token: Ulid) {
        {
            let mut pending = self.pending_disconnects.lock().await;
            if !pending.get(player_id).is_some_and(|p| p.token == token) {
                return;
            }
            // Dropping our own handle detaches rather than aborts
            pending.remove(player_id);
        }

        // A refresh may have bound a new socket before the old one closed
        if self.player_has_connection(room_code, player_id).await {
            return;
        }

        let Some(shared) = self.lookup_room(room_code).await else {
            return;
        };
        let mut room = shared.lock().await;
        self.mark_disconnected(&mut room, player_id).await;
    }

    /// Flag a player as disconnected, apply the player-count guard and, if
    /// it is their turn, watch for them not coming back
    pub async fn mark_disconnected(&self, room: &mut Room, player_id: &str) -> bool {
        let Some(player) = room.player_mut(player_id) else {
            return false;
        };
        player.connected = false;
        let name = player.name.clone();
        tracing::info!("Player {} disconnected from room {}", name, room.code);

        let paused = self.enforce_player_count(room).await;
        room.touch();
        self.broadcast_room_state(room).await;

        if !paused && room.active_player_id().map(String::as_str) == Some(player_id) {
            self.schedule_absence_check(room, player_id, self.timing.disconnect_prompt_delay);
        }
        true
    }

    /// Reattach a known player to a fresh socket
    pub async fn resume_player(&self, room: &mut Room, conn_id: &str, player_id: &str) -> bool {
        let Some(player) = room.player_mut(player_id) else {
            return false;
        };
        player.connected = true;
        let name = player.name.clone();
        tracing::info!("Player {} resumed in room {}", name, room.code);

        self.cancel_pending_disconnect(player_id).await;
        self.bind(conn_id, &room.code, player_id).await;

        let targeted = room
            .absence
            .as_ref()
            .is_some_and(|a| a.target_id == player_id);
        if targeted {
            self.clear_absence(room, true).await;
        }
        true
    }
}
