mod absence;
mod registry;
mod roster;
mod session;
pub mod stats;
mod turn;
pub mod visibility;

pub use absence::AbsenceRecord;
pub use registry::{generate_room_code, normalize_code};
pub use roster::{generate_player_id, sanitize_text};
pub use session::{Binding, Connection};
pub use stats::UsageStats;
pub use turn::RemovalEffect;

use crate::abuse::AbuseConfig;
use crate::content::ContentSet;
use crate::digest::{DigestConfig, DigestService};
use crate::types::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use ulid::Ulid;

/// A room behind its own lock; actions on different rooms never contend
pub type SharedRoom = Arc<Mutex<Room>>;

/// Scheduled "mark disconnected" for a player whose socket closed
#[derive(Debug)]
pub struct PendingDisconnect {
    pub token: Ulid,
    pub handle: JoinHandle<()>,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RwLock<HashMap<RoomCode, SharedRoom>>>,
    pub connections: Arc<RwLock<HashMap<ConnectionId, Connection>>>,
    pub pending_disconnects: Arc<Mutex<HashMap<PlayerId, PendingDisconnect>>>,
    /// Authoritative theme content for seeding menus
    pub content: Arc<ContentSet>,
    pub timing: TimingConfig,
    pub abuse: Arc<AbuseConfig>,
    pub stats: Arc<RwLock<UsageStats>>,
    pub digest: Arc<DigestService>,
}

impl AppState {
    pub fn new() -> Self {
        Self::new_with(
            ContentSet::default(),
            TimingConfig::default(),
            AbuseConfig::default(),
            DigestService::new(DigestConfig::default()),
        )
    }

    pub fn new_with(
        content: ContentSet,
        timing: TimingConfig,
        abuse: AbuseConfig,
        digest: DigestService,
    ) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            connections: Arc::new(RwLock::new(HashMap::new())),
            pending_disconnects: Arc::new(Mutex::new(HashMap::new())),
            content: Arc::new(content),
            timing,
            abuse: Arc::new(abuse),
            stats: Arc::new(RwLock::new(UsageStats::default())),
            digest: Arc::new(digest),
        }
    }

    /// Same state with different content, for tests and tools
    pub fn with_content(content: ContentSet) -> Self {
        Self {
            content: Arc::new(content),
            ..Self::new()
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
