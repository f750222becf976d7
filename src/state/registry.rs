use super::{AppState, SharedRoom};
use crate::error::GameError;
use crate::types::*;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Codes arrive from user input: trimmed, lowercased, length-capped
pub fn normalize_code(raw: &str) -> RoomCode {
    raw.trim().to_lowercase().chars().take(MAX_CODE_CHARS).collect()
}

/// Three dictionary words joined by hyphens
pub fn generate_room_code() -> RoomCode {
    petname::petname(3, "-").unwrap_or_else(|| ulid::Ulid::new().to_string().to_lowercase())
}

impl AppState {
    /// Create an empty lobby under a fresh code
    pub async fn create_room(&self) -> SharedRoom {
        let mut rooms = self.rooms.write().await;
        let code = loop {
            let code = generate_room_code();
            if !rooms.contains_key(&code) {
                break code;
            }
        };
        let room = Arc::new(Mutex::new(Room::new(code.clone())));
        rooms.insert(code.clone(), room.clone());
        tracing::info!("Created room {}", code);
        room
    }

    /// Create a room under a chosen code, unless it is taken
    pub async fn create_room_with_code(&self, code: &str) -> Option<SharedRoom> {
        let code = normalize_code(code);
        let mut rooms = self.rooms.write().await;
        if code.is_empty() || rooms.contains_key(&code) {
            return None;
        }
        let room = Arc::new(Mutex::new(Room::new(code.clone())));
        rooms.insert(code, room.clone());
        Some(room)
    }

    /// Plain lookup by exact code, no expiry check
    pub async fn lookup_room(&self, code: &str) -> Option<SharedRoom> {
        self.rooms.read().await.get(code).cloned()
    }

    /// Lookup for user-supplied codes. An expired room is torn down on the
    /// spot and reported as absent.
    pub async fn get_room(&self, raw_code: &str) -> Option<SharedRoom> {
        let code = normalize_code(raw_code);
        let shared = self.lookup_room(&code).await?;
        let expired = shared
            .lock()
            .await
            .is_expired(self.timing.room_ttl, Utc::now());
        if expired {
            self.expire_room(&code).await;
            return None;
        }
        Some(shared)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Remove a room without notifying anyone
    pub async fn delete_room(&self, code: &str) -> Option<SharedRoom> {
        let shared = self.rooms.write().await.remove(code)?;
        // Aborts any outstanding absence timers
        shared.lock().await.absence = None;
        Some(shared)
    }

    /// Delete a room and tell its sockets
    pub async fn expire_room(&self, code: &str) {
        if self.delete_room(code).await.is_none() {
            return;
        }
        tracing::info!("Room {} expired", code);
        self.send_to_room(code, GameError::RoomExpired.into()).await;

        for conn in self.connections.write().await.values_mut() {
            if conn.binding.as_ref().is_some_and(|b| b.room_code == code) {
                conn.binding = None;
            }
        }
    }

    /// Delete every room idle past the TTL. Returns how many were removed.
    pub async fn sweep_expired_rooms(&self) -> usize {
        let now = Utc::now();
        let rooms: Vec<(RoomCode, SharedRoom)> = self
            .rooms
            .read()
            .await
            .iter()
            .map(|(code, room)| (code.clone(), room.clone()))
            .collect();

        let mut expired = Vec::new();
        for (code, room) in rooms {
            if room.lock().await.is_expired(self.timing.room_ttl, now) {
                expired.push(code);
            }
        }
        for code in &expired {
            self.expire_room(code).await;
        }
        expired.len()
    }
}
