//! Errors surfaced to clients as `room:error` events

use crate::protocol::ServerMessage;
use crate::types::MAX_MENU_ENTRIES;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("Rate limit exceeded. Please wait a bit and try again.")]
    RateLimited,

    #[error("No such game (it may have expired).")]
    NoSuchRoom,

    #[error("This game already has the maximum of {MAX_MENU_ENTRIES} dares.")]
    DareLimit,

    #[error("Room expired")]
    RoomExpired,
}

impl GameError {
    /// Stable code clients switch on
    pub fn code(&self) -> &'static str {
        match self {
            GameError::RateLimited => "RATE_LIMIT",
            GameError::NoSuchRoom => "NO_SUCH_ROOM",
            GameError::DareLimit => "DARE_LIMIT",
            GameError::RoomExpired => "ROOM_EXPIRED",
        }
    }
}

impl From<GameError> for ServerMessage {
    fn from(err: GameError) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}
