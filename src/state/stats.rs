//! Process-wide usage counters and the daily digest built from them

use super::AppState;
use crate::digest::{DeliveryStatus, DigestError};
use crate::types::RoomCode;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet, VecDeque};

/// Per-game log is capped; oldest events fall off first
pub const MAX_EVENTS_PER_GAME: usize = 500;
/// Games included in one digest
pub const DIGEST_GAME_LIMIT: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct GameEvent {
    pub ts: DateTime<Utc>,
    pub kind: &'static str,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct GameLog {
    pub code: RoomCode,
    pub created_at: DateTime<Utc>,
    pub theme: Option<String>,
    pub started: bool,
    pub events: VecDeque<GameEvent>,
}

impl GameLog {
    fn new(code: &str, now: DateTime<Utc>) -> Self {
        Self {
            code: code.to_string(),
            created_at: now,
            theme: None,
            started: false,
            events: VecDeque::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub since: DateTime<Utc>,
    pub unique_visitors: usize,
    pub attempted_starts: u64,
    pub successful_starts: u64,
    pub tracked_games: usize,
    pub success_since_last_send: bool,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub last_digest_day: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct UsageStats {
    pub since: DateTime<Utc>,
    /// SHA-256 of client addresses
    visitors: HashSet<String>,
    pub attempted_starts: u64,
    pub successful_starts: u64,
    games: HashMap<RoomCode, GameLog>,
    pub success_since_last_send: bool,
    pub last_sent_at: Option<DateTime<Utc>>,
    /// Starts at today so the first digest waits for the next day boundary
    pub last_digest_day: NaiveDate,
}

impl Default for UsageStats {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

pub fn hash_visitor(ip: &str) -> String {
    hex::encode(Sha256::digest(ip.as_bytes()))
}

impl UsageStats {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            since: now,
            visitors: HashSet::new(),
            attempted_starts: 0,
            successful_starts: 0,
            games: HashMap::new(),
            success_since_last_send: false,
            last_sent_at: None,
            last_digest_day: now.date_naive(),
        }
    }

    pub fn record_visitor(&mut self, ip: &str) {
        self.visitors.insert(hash_visitor(ip));
    }

    pub fn unique_visitors(&self) -> usize {
        self.visitors.len()
    }

    fn game(&mut self, code: &str, now: DateTime<Utc>) -> &mut GameLog {
        self.games
            .entry(code.to_string())
            .or_insert_with(|| GameLog::new(code, now))
    }

    pub fn game_log(&self, code: &str) -> Option<&GameLog> {
        self.games.get(code)
    }

    pub fn record_event(&mut self, code: &str, kind: &'static str, message: String) {
        let now = Utc::now();
        let game = self.game(code, now);
        game.events.push_back(GameEvent {
            ts: now,
            kind,
            message,
        });
        if game.events.len() > MAX_EVENTS_PER_GAME {
            game.events.pop_front();
        }
    }

    pub fn record_room_created(&mut self, code: &str, creator: &str) {
        self.attempted_starts += 1;
        self.record_event(code, "create", format!("{} created the room", creator));
    }

    /// Returns true the first time a room starts
    pub fn record_game_started(&mut self, code: &str, theme: &str) -> bool {
        let game = self.game(code, Utc::now());
        game.theme = Some(theme.to_string());
        let first = !game.started;
        game.started = true;

        if first {
            self.successful_starts += 1;
            self.success_since_last_send = true;
            self.record_event(code, "start", format!("Game started (theme: {})", theme));
        } else {
            self.record_event(code, "start", format!("Game resumed (theme: {})", theme));
        }
        first
    }

    /// A new UTC day began and something worth reporting happened
    pub fn digest_due(&self, now: DateTime<Utc>) -> bool {
        self.last_digest_day != now.date_naive() && self.success_since_last_send
    }

    /// Start a fresh period after a successful send
    pub fn reset(&mut self, now: DateTime<Utc>) {
        *self = Self {
            last_sent_at: Some(now),
            ..Self::new(now)
        };
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            since: self.since,
            unique_visitors: self.visitors.len(),
            attempted_starts: self.attempted_starts,
            successful_starts: self.successful_starts,
            tracked_games: self.games.len(),
            success_since_last_send: self.success_since_last_send,
            last_sent_at: self.last_sent_at,
            last_digest_day: self.last_digest_day,
        }
    }

    pub fn digest_text(&self, now: DateTime<Utc>) -> String {
        let mut lines = vec![
            "Dare Dash: daily usage summary".to_string(),
            format!("Period start: {}", self.since.to_rfc3339()),
            format!("Generated at: {}", now.to_rfc3339()),
            String::new(),
            format!("1) Total unique visitors: {}", self.visitors.len()),
            format!(
                "2) Attempted game starts (room:create): {}",
                self.attempted_starts
            ),
            format!(
                "3) Games successfully started (>=3 players and clicked start): {}",
                self.successful_starts
            ),
            String::new(),
        ];

        let mut started: Vec<&GameLog> = self.games.values().filter(|g| g.started).collect();
        started.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        if started.is_empty() {
            lines.push("No successfully started games in this period.".to_string());
        } else {
            lines.push(format!("4) Up to {} game logs:", DIGEST_GAME_LIMIT));
            for game in started.into_iter().take(DIGEST_GAME_LIMIT) {
                lines.push(String::new());
                lines.push(format!(
                    "Game {} (theme: {}) created at {}",
                    game.code,
                    game.theme.as_deref().unwrap_or("(unknown)"),
                    game.created_at.to_rfc3339()
                ));
                for ev in &game.events {
                    lines.push(format!(
                        " - [{}] {}: {}",
                        ev.ts.to_rfc3339(),
                        ev.kind,
                        ev.message
                    ));
                }
            }
        }

        lines.join("\n")
    }
}

impl AppState {
    pub async fn record_visitor(&self, ip: &str) {
        self.stats.write().await.record_visitor(ip);
    }

    pub async fn log_event(&self, code: &str, kind: &'static str, message: String) {
        self.stats.write().await.record_event(code, kind, message);
    }

    pub async fn digest_preview(&self) -> String {
        self.stats.read().await.digest_text(Utc::now())
    }

    /// Compose and send the digest now; counters reset only on success
    pub async fn send_digest(
        &self,
        to: Option<&str>,
        subject: Option<&str>,
    ) -> Result<DeliveryStatus, DigestError> {
        let text = self.digest_preview().await;
        let status = self.digest.deliver(text, to, subject).await?;
        self.stats.write().await.reset(Utc::now());
        Ok(status)
    }

    /// Periodic check: at most one digest per UTC day, and only once a game started
    pub async fn maybe_send_daily_digest(&self) -> bool {
        if !self.stats.read().await.digest_due(Utc::now()) {
            return false;
        }
        self.send_digest(None, None).await.is_ok()
    }
}
