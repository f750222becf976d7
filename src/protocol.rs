use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum ClientMessage {
    #[serde(rename = "room:create")]
    RoomCreate {
        #[serde(default)]
        name: String,
        /// Preferred theme, applied when the game starts
        #[serde(default)]
        theme: Option<String>,
    },
    #[serde(rename = "room:join")]
    RoomJoin {
        #[serde(default)]
        code: String,
        #[serde(default)]
        name: String,
    },
    #[serde(rename = "room:leave")]
    RoomLeave,
    /// Read-only preview before joining
    #[serde(rename = "room:peek")]
    RoomPeek {
        #[serde(default)]
        code: String,
    },
    /// Reattach to an existing player after refresh/reconnect
    #[serde(rename = "room:resume", rename_all = "camelCase")]
    RoomResume {
        #[serde(default)]
        code: String,
        #[serde(default)]
        player_id: PlayerId,
    },
    #[serde(rename = "player:update")]
    PlayerUpdate {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        color: Option<String>,
    },
    /// Start the game. Any client-supplied content is ignored.
    #[serde(rename = "theme:finalize")]
    ThemeFinalize {
        #[serde(default)]
        theme: Option<String>,
    },
    #[serde(rename = "game:resume")]
    GameResume,
    #[serde(rename = "turn:selectDare")]
    SelectDare { index: usize },
    #[serde(rename = "turn:submit")]
    Submit { response: ResponseKind },
    #[serde(rename = "turn:pass")]
    Pass,
    #[serde(rename = "turn:complete", rename_all = "camelCase")]
    Complete {
        #[serde(default)]
        completed_most_daring: bool,
    },
    #[serde(rename = "menu:addDare")]
    AddDare {
        #[serde(default)]
        title: String,
        #[serde(default)]
        extra: String,
    },
    /// Sent by the active player's client after local inactivity
    #[serde(rename = "idle:escalate")]
    IdleEscalate,
    #[serde(rename = "absent:response", rename_all = "camelCase")]
    AbsentResponse {
        prompt_id: PromptId,
        target_id: PlayerId,
        present: bool,
    },
}

impl ClientMessage {
    /// Action name as it appears on the wire (also the rate-limit bucket)
    pub fn action(&self) -> &'static str {
        match self {
            ClientMessage::RoomCreate { .. } => "room:create",
            ClientMessage::RoomJoin { .. } => "room:join",
            ClientMessage::RoomLeave => "room:leave",
            ClientMessage::RoomPeek { .. } => "room:peek",
            ClientMessage::RoomResume { .. } => "room:resume",
            ClientMessage::PlayerUpdate { .. } => "player:update",
            ClientMessage::ThemeFinalize { .. } => "theme:finalize",
            ClientMessage::GameResume => "game:resume",
            ClientMessage::SelectDare { .. } => "turn:selectDare",
            ClientMessage::Submit { .. } => "turn:submit",
            ClientMessage::Pass => "turn:pass",
            ClientMessage::Complete { .. } => "turn:complete",
            ClientMessage::AddDare { .. } => "menu:addDare",
            ClientMessage::IdleEscalate => "idle:escalate",
            ClientMessage::AbsentResponse { .. } => "absent:response",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum ServerMessage {
    #[serde(rename = "player:you", rename_all = "camelCase")]
    PlayerYou { player_id: PlayerId },
    /// Full room snapshot, tailored to the recipient
    #[serde(rename = "room:state")]
    RoomState(RoomView),
    #[serde(rename = "room:peek:result", rename_all = "camelCase")]
    PeekResult {
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        state: Option<RoomView>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        used_colors: Vec<String>,
    },
    #[serde(rename = "room:error")]
    Error { code: String, message: String },
    #[serde(rename = "absent:prompt", rename_all = "camelCase")]
    AbsentPrompt {
        prompt_id: PromptId,
        target_id: PlayerId,
        target_name: String,
    },
    #[serde(rename = "absent:dismiss", rename_all = "camelCase")]
    AbsentDismiss { prompt_id: PromptId },
}

/// Room snapshot as sent to one recipient
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub code: RoomCode,
    pub state: RoomPhase,
    pub paused: bool,
    pub host_id: Option<PlayerId>,
    pub players: Vec<Player>,
    pub chosen_theme: Option<String>,
    pub dare_menu: Vec<DareEntry>,
    pub turn: Option<TurnView>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TurnView {
    pub order: Vec<PlayerId>,
    pub index: usize,
    pub selected_dare_index: Option<usize>,
    pub submissions: Vec<SubmissionView>,
    pub status: TurnStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adding_by: Option<PlayerId>,
}

/// A submission as seen by one recipient. `response` is withheld for
/// other players' submissions unless the recipient is the active player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionView {
    pub player_id: PlayerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseKind>,
    pub ts: DateTime<Utc>,
}

impl SubmissionView {
    pub fn full(s: &Submission) -> Self {
        Self {
            player_id: s.player_id.clone(),
            response: Some(s.response),
            ts: s.ts,
        }
    }

    pub fn placeholder(s: &Submission) -> Self {
        Self {
            player_id: s.player_id.clone(),
            response: None,
            ts: s.ts,
        }
    }
}
