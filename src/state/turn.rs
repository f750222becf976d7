//! Turn rotation and the collecting/authoring state machine.
//!
//! Everything here is synchronous and operates on a single `Turn`; the
//! websocket handlers decide *whether* an action is allowed for the room
//! (phase, rate limits) and these methods decide what it does to the turn.
//! Methods return `false` when the action does not apply to the current
//! state, which callers treat as a silent no-op.

use crate::error::GameError;
use crate::types::*;
use chrono::{DateTime, Utc};

/// What a removal did to the turn, so the caller knows whether focus moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemovalEffect {
    pub was_in_order: bool,
    pub was_active: bool,
    pub was_author: bool,
}

impl Turn {
    /// Fresh turn at the first player, nothing selected
    pub fn new(order: Vec<PlayerId>) -> Self {
        Self {
            order,
            index: 0,
            phase: TurnPhase::default(),
        }
    }

    pub fn active_id(&self) -> Option<&PlayerId> {
        self.order.get(self.index)
    }

    pub fn status(&self) -> TurnStatus {
        match self.phase {
            TurnPhase::Collecting { .. } => TurnStatus::Collecting,
            TurnPhase::Authoring { .. } => TurnStatus::Adding,
        }
    }

    pub fn selected(&self) -> Option<usize> {
        match &self.phase {
            TurnPhase::Collecting { selected, .. } => *selected,
            TurnPhase::Authoring { .. } => None,
        }
    }

    pub fn adding_by(&self) -> Option<&PlayerId> {
        match &self.phase {
            TurnPhase::Authoring { by } => Some(by),
            TurnPhase::Collecting { .. } => None,
        }
    }

    pub fn submissions(&self) -> &[Submission] {
        match &self.phase {
            TurnPhase::Collecting { submissions, .. } => submissions,
            TurnPhase::Authoring { .. } => &[],
        }
    }

    /// Propose a dare. Allowed for anyone while collecting; the active-player
    /// convention is enforced by clients only.
    pub fn select(&mut self, index: usize, menu_len: usize) -> bool {
        if index >= menu_len {
            return false;
        }
        match self.phase {
            TurnPhase::Collecting { .. } => {
                self.phase = TurnPhase::Collecting {
                    selected: Some(index),
                    submissions: Vec::new(),
                };
                true
            }
            TurnPhase::Authoring { .. } => false,
        }
    }

    /// Record (or overwrite) a player's response. The active player never
    /// responds to their own dare.
    pub fn submit(&mut self, player_id: &str, response: ResponseKind, ts: DateTime<Utc>) -> bool {
        if self.active_id().map(String::as_str) == Some(player_id) {
            return false;
        }
        if !self.order.iter().any(|id| id == player_id) {
            return false;
        }
        let TurnPhase::Collecting { submissions, .. } = &mut self.phase else {
            return false;
        };

        let submission = Submission {
            player_id: player_id.to_string(),
            response,
            ts,
        };
        match submissions.iter_mut().find(|s| s.player_id == player_id) {
            Some(existing) => *existing = submission,
            None => submissions.push(submission),
        }
        true
    }

    /// Skip the current dare and hand the turn to the next player
    pub fn pass(&mut self) -> bool {
        if matches!(self.phase, TurnPhase::Authoring { .. }) {
            return false;
        }
        self.phase = TurnPhase::default();
        self.advance();
        true
    }

    /// Resolve the current dare. Completing the most intense entry keeps the
    /// turn on the active player, who must author a replacement first.
    pub fn complete(&mut self, completed_most_intense: bool) -> bool {
        if matches!(self.phase, TurnPhase::Authoring { .. }) {
            return false;
        }

        let author = self.active_id().cloned();
        match author {
            Some(by) if completed_most_intense => {
                self.phase = TurnPhase::Authoring { by };
            }
            _ => {
                self.phase = TurnPhase::default();
                self.advance();
            }
        }
        true
    }

    /// Append a new entry written by the privileged author and move on.
    ///
    /// Returns `Ok(false)` when no authoring window is open for `by`. A full
    /// menu rejects the entry and leaves the authoring window open.
    pub fn add_dare(
        &mut self,
        by: &str,
        entry: DareEntry,
        menu: &mut Vec<DareEntry>,
    ) -> Result<bool, GameError> {
        match &self.phase {
            TurnPhase::Authoring { by: author } if author == by => {}
            _ => return Ok(false),
        }
        if menu.len() >= MAX_MENU_ENTRIES {
            return Err(GameError::DareLimit);
        }

        menu.push(entry);
        self.phase = TurnPhase::default();
        self.advance();
        Ok(true)
    }

    /// Put a mid-game joiner right after the active player
    pub fn insert_after_active(&mut self, player_id: &str) -> bool {
        if self.order.iter().any(|id| id == player_id) {
            return false;
        }
        let at = if self.order.is_empty() {
            0
        } else {
            (self.index + 1).min(self.order.len())
        };
        self.order.insert(at, player_id.to_string());
        true
    }

    /// Drop a player from rotation, keeping `index` on the same logical next
    /// player and resetting the turn when the active or authoring player left.
    pub fn remove_player(&mut self, player_id: &str) -> RemovalEffect {
        let mut effect = RemovalEffect {
            was_active: self.active_id().map(String::as_str) == Some(player_id),
            was_author: self.adding_by().map(String::as_str) == Some(player_id),
            ..Default::default()
        };

        if let Some(pos) = self.order.iter().position(|id| id == player_id) {
            effect.was_in_order = true;
            self.order.remove(pos);
            if self.order.is_empty() {
                self.index = 0;
            } else if pos < self.index {
                self.index -= 1;
            } else if self.index >= self.order.len() {
                self.index = 0;
            }
        }

        if effect.was_active || effect.was_author {
            self.phase = TurnPhase::default();
        } else if let TurnPhase::Collecting { submissions, .. } = &mut self.phase {
            submissions.retain(|s| s.player_id != player_id);
        }

        effect
    }

    fn advance(&mut self) {
        if self.order.is_empty() {
            self.index = 0;
        } else {
            self.index = (self.index + 1) % self.order.len();
        }
    }
}
