use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::state::AbsenceRecord;

/// Opaque ID types for type safety
pub type RoomCode = String;
pub type PlayerId = String;
pub type ConnectionId = String;
pub type PromptId = String;

/// Rooms below this many connected players pause (and cannot start)
pub const MIN_CONNECTED_PLAYERS: usize = 3;
/// Hard cap on the challenge menu
pub const MAX_MENU_ENTRIES: usize = 100;

pub const MAX_NAME_CHARS: usize = 30;
pub const MAX_DARE_TITLE_CHARS: usize = 120;
pub const MAX_DARE_EXTRA_CHARS: usize = 160;
pub const MAX_CODE_CHARS: usize = 64;
pub const DEFAULT_PLAYER_NAME: &str = "Player";

/// Player colours, handed out first-unused-first
pub const PALETTE: &[&str] = &[
    "Purple", "Red", "White", "Brown", "Grey", "DkBlue", "Silver", "Green", "Orange", "Lavender",
    "DkRed", "Black", "Blue", "Pink", "LtBlue", "LtPink", "Yellow", "DkGreen",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoomPhase {
    Lobby,
    Main,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub color: Option<String>,
    pub connected: bool,
}

/// One challenge on the menu. Seeded entries have no author.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DareEntry {
    pub title: String,
    pub extra: String,
    pub created_by: Option<PlayerId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseKind {
    /// Dare plus the extra challenge
    HeckYes,
    /// Dare only
    YesPlease,
    NoThanks,
}

impl ResponseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseKind::HeckYes => "HECK_YES",
            ResponseKind::YesPlease => "YES_PLEASE",
            ResponseKind::NoThanks => "NO_THANKS",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub player_id: PlayerId,
    pub response: ResponseKind,
    pub ts: DateTime<Utc>,
}

/// Wire-level turn status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Collecting,
    Adding,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnPhase {
    /// Waiting for (or collecting responses to) a selected dare
    Collecting {
        selected: Option<usize>,
        submissions: Vec<Submission>,
    },
    /// `by` must write a new menu entry before rotation continues
    Authoring { by: PlayerId },
}

impl Default for TurnPhase {
    fn default() -> Self {
        TurnPhase::Collecting {
            selected: None,
            submissions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub order: Vec<PlayerId>,
    pub index: usize,
    pub phase: TurnPhase,
}

#[derive(Debug)]
pub struct Room {
    pub code: RoomCode,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub phase: RoomPhase,
    /// Set when the room dropped back to the lobby for lack of players
    pub paused: bool,
    pub host_id: Option<PlayerId>,
    pub players: Vec<Player>,
    /// Theme requested at creation time; takes precedence when the game starts
    pub preferred_theme: Option<String>,
    pub chosen_theme: Option<String>,
    pub menu: Vec<DareEntry>,
    pub turn: Option<Turn>,
    pub absence: Option<AbsenceRecord>,
}

impl Room {
    pub fn new(code: RoomCode) -> Self {
        let now = Utc::now();
        Self {
            code,
            created_at: now,
            last_activity: now,
            phase: RoomPhase::Lobby,
            paused: false,
            host_id: None,
            players: Vec::new(),
            preferred_theme: None,
            chosen_theme: None,
            menu: Vec::new(),
            turn: None,
            absence: None,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let idle = now.signed_duration_since(self.last_activity);
        idle.to_std().map(|idle| idle > ttl).unwrap_or(false)
    }

    pub fn active_player_id(&self) -> Option<&PlayerId> {
        self.turn.as_ref().and_then(|t| t.active_id())
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn player_name(&self, id: &str) -> String {
        self.player(id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| DEFAULT_PLAYER_NAME.to_string())
    }

    pub fn connected_count(&self) -> usize {
        self.players.iter().filter(|p| p.connected).count()
    }
}

/// Timers and thresholds driving rooms, sessions and background tasks
#[derive(Debug, Clone)]
pub struct TimingConfig {
    /// Rooms idle longer than this are deleted
    pub room_ttl: Duration,
    pub sweep_interval: Duration,
    /// Grace period before a closed socket marks its player disconnected
    pub disconnect_grace: Duration,
    /// Delay before checking the active player after a turn focus change
    pub focus_prompt_delay: Duration,
    /// Delay before checking an active player who just disconnected
    pub disconnect_prompt_delay: Duration,
    /// Cooldown before asking again after the room said "still here"
    pub reask_delay: Duration,
    pub rate_limit_prune_interval: Duration,
    pub digest_check_interval: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            room_ttl: Duration::from_secs(3 * 60 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
            disconnect_grace: Duration::from_secs(2),
            focus_prompt_delay: Duration::from_secs(1),
            disconnect_prompt_delay: Duration::from_secs(10),
            reask_delay: Duration::from_secs(60),
            rate_limit_prune_interval: Duration::from_secs(60),
            digest_check_interval: Duration::from_secs(5 * 60),
        }
    }
}

fn env_duration(key: &str, unit: fn(u64) -> Duration, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .map(unit)
        .unwrap_or(default)
}

impl TimingConfig {
    /// Load timing overrides from environment variables
    pub fn from_env() -> Self {
        let d = Self::default();
        let config = Self {
            room_ttl: env_duration("ROOM_TTL_SECS", Duration::from_secs, d.room_ttl),
            sweep_interval: env_duration("ROOM_SWEEP_SECS", Duration::from_secs, d.sweep_interval),
            disconnect_grace: env_duration(
                "DISCONNECT_GRACE_MS",
                Duration::from_millis,
                d.disconnect_grace,
            ),
            focus_prompt_delay: env_duration(
                "ABSENT_FOCUS_DELAY_MS",
                Duration::from_millis,
                d.focus_prompt_delay,
            ),
            disconnect_prompt_delay: env_duration(
                "ABSENT_DISCONNECT_DELAY_MS",
                Duration::from_millis,
                d.disconnect_prompt_delay,
            ),
            reask_delay: env_duration("ABSENT_REASK_SECS", Duration::from_secs, d.reask_delay),
            rate_limit_prune_interval: env_duration(
                "RATE_LIMIT_PRUNE_SECS",
                Duration::from_secs,
                d.rate_limit_prune_interval,
            ),
            digest_check_interval: env_duration(
                "DIGEST_CHECK_SECS",
                Duration::from_secs,
                d.digest_check_interval,
            ),
        };

        tracing::info!(
            room_ttl_secs = config.room_ttl.as_secs(),
            disconnect_grace_ms = config.disconnect_grace.as_millis() as u64,
            "Timing config loaded"
        );

        config
    }
}
