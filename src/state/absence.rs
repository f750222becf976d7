//! Absent active player detection.
//!
//! When turn focus lands on a player, a deferred check is scheduled. If it
//! fires while that player is still active and still disconnected, the room
//! is asked whether they are still playing. The first matching answer wins:
//! "present" schedules a re-ask after a cooldown, "not present" removes them.
//!
//! Timers are tokio tasks whose handles live in the room's `AbsenceRecord`.
//! Dropping the record aborts them, so clearing the record (or deleting the
//! room) cancels everything outstanding. A timer that fires into a changed
//! room is a no-op.

use super::AppState;
use crate::protocol::ServerMessage;
use crate::types::*;
use chrono::Utc;
use std::time::Duration;
use tokio::task::JoinHandle;
use ulid::Ulid;

#[derive(Debug)]
pub struct AbsenceRecord {
    pub target_id: PlayerId,
    /// Set while a prompt is out and answerable
    pub prompt_id: Option<PromptId>,
    prompt_timer: Option<JoinHandle<()>>,
    reask_timer: Option<JoinHandle<()>>,
}

impl AbsenceRecord {
    pub fn new(target_id: &str) -> Self {
        Self {
            target_id: target_id.to_string(),
            prompt_id: None,
            prompt_timer: None,
            reask_timer: None,
        }
    }

    pub fn has_pending_timer(&self) -> bool {
        self.prompt_timer.is_some() || self.reask_timer.is_some()
    }
}

impl Drop for AbsenceRecord {
    fn drop(&mut self) {
        for timer in [self.prompt_timer.take(), self.reask_timer.take()]
            .into_iter()
            .flatten()
        {
            timer.abort();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Prompt,
    Reask,
}

impl AppState {
    /// Turn focus changed: dismiss any prompt and start watching the new
    /// active player
    pub async fn focus_turn(&self, room: &mut Room) {
        self.clear_absence(room, true).await;
        if room.phase != RoomPhase::Main || room.paused {
            return;
        }
        let Some(active) = room.active_player_id().cloned() else {
            return;
        };

        tracing::info!(
            "Turn focus in room {}: {} (connected: {})",
            room.code,
            room.player_name(&active),
            room.player(&active).is_some_and(|p| p.connected)
        );
        self.schedule_absence_check(room, &active, self.timing.focus_prompt_delay);
    }

    /// Drop the absence record, aborting its timers. With `dismiss`, an
    /// outstanding prompt is withdrawn from every client in the room.
    pub async fn clear_absence(&self, room: &mut Room, dismiss: bool) {
        let Some(record) = room.absence.take() else {
            return;
        };
        if dismiss {
            if let Some(prompt_id) = record.prompt_id.clone() {
                self.send_to_room(&room.code, ServerMessage::AbsentDismiss { prompt_id })
                    .await;
            }
        }
    }

    /// Check on `target` after `delay`; prompts the room if they are still the
    /// disconnected active player by then
    pub fn schedule_absence_check(&self, room: &mut Room, target: &str, delay: Duration) {
        let timer = self.spawn_absence_timer(&room.code, target, delay, TimerKind::Prompt);
        let record = self.absence_record_for(room, target);
        if let Some(old) = record.prompt_timer.replace(timer) {
            old.abort();
        }

        tracing::debug!(
            "Absence check for {} in room {} in {}ms",
            target,
            room.code,
            delay.as_millis()
        );
    }

    /// After a "still here" answer, ask again once the cooldown passes
    pub fn schedule_absence_reask(&self, room: &mut Room, delay: Duration) {
        let Some(target) = room.absence.as_ref().map(|a| a.target_id.clone()) else {
            return;
        };
        let timer = self.spawn_absence_timer(&room.code, &target, delay, TimerKind::Reask);
        if let Some(record) = room.absence.as_mut() {
            if let Some(old) = record.reask_timer.replace(timer) {
                old.abort();
            }
        }
    }

    /// Record for `target`, replacing one that tracks somebody else
    fn absence_record_for<'a>(&self, room: &'a mut Room, target: &str) -> &'a mut AbsenceRecord {
        if room
            .absence
            .as_ref()
            .is_some_and(|a| a.target_id != target)
        {
            room.absence = None;
        }
        room.absence
            .get_or_insert_with(|| AbsenceRecord::new(target))
    }

    fn spawn_absence_timer(
        &self,
        code: &str,
        target: &str,
        delay: Duration,
        kind: TimerKind,
    ) -> JoinHandle<()> {
        let state = self.clone();
        let code = code.to_string();
        let target = target.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            state.fire_absence_timer(&code, &target, kind).await;
        })
    }

    async fn fire_absence_timer(&self, code: &str, target: &str, kind: TimerKind) {
        let Some(shared) = self.lookup_room(code).await else {
            return;
        };
        let mut guard = shared.lock().await;
        let room = &mut *guard;

        let Some(record) = room.absence.as_mut() else {
            return;
        };
        if record.target_id != target {
            return;
        }
        // Detach our own handle so clearing the record later cannot abort us
        match kind {
            TimerKind::Prompt => drop(record.prompt_timer.take()),
            TimerKind::Reask => drop(record.reask_timer.take()),
        }

        if room.is_expired(self.timing.room_ttl, Utc::now()) {
            drop(guard);
            self.expire_room(code).await;
            return;
        }

        let still_absent = room.phase == RoomPhase::Main
            && !room.paused
            && room.active_player_id().map(String::as_str) == Some(target)
            && room.player(target).is_some_and(|p| !p.connected);
        if !still_absent {
            return;
        }

        self.broadcast_absent_prompt(room, target).await;
    }

    async fn broadcast_absent_prompt(&self, room: &mut Room, target: &str) {
        let prompt_id = Ulid::new().to_string();
        let target_name = room.player_name(target);
        self.absence_record_for(room, target).prompt_id = Some(prompt_id.clone());

        tracing::info!(
            "Asking room {} whether {} is still playing",
            room.code,
            target_name
        );
        self.send_to_room(
            &room.code,
            ServerMessage::AbsentPrompt {
                prompt_id,
                target_id: target.to_string(),
                target_name,
            },
        )
        .await;
    }

    /// The active player's own client reports local inactivity. Only honoured
    /// while the server still sees them connected.
    pub async fn escalate_idle(&self, room: &mut Room, player_id: &str) -> bool {
        if room.phase != RoomPhase::Main || room.paused {
            return false;
        }
        if room.active_player_id().map(String::as_str) != Some(player_id) {
            return false;
        }
        if !room.player(player_id).is_some_and(|p| p.connected) {
            return false;
        }

        self.broadcast_absent_prompt(room, player_id).await;
        true
    }

    /// Apply an answer to the outstanding prompt. Returns false for stale or
    /// mismatched answers, which are ignored.
    pub async fn answer_absent_prompt(
        &self,
        room: &mut Room,
        responder: &str,
        prompt_id: &str,
        target_id: &str,
        present: bool,
    ) -> bool {
        if responder == target_id {
            return false;
        }
        let Some(record) = room.absence.as_mut() else {
            return false;
        };
        if record.prompt_id.as_deref() != Some(prompt_id) || record.target_id != target_id {
            return false;
        }
        // First answer wins
        record.prompt_id = None;

        self.send_to_room(
            &room.code,
            ServerMessage::AbsentDismiss {
                prompt_id: prompt_id.to_string(),
            },
        )
        .await;

        if present {
            tracing::info!("{} confirmed still playing in room {}", target_id, room.code);
            self.schedule_absence_reask(room, self.timing.reask_delay);
            room.touch();
            return true;
        }

        let name = room.player_name(target_id);
        self.remove_member(room, target_id).await;
        self.log_event(
            &room.code,
            "leave",
            format!("{} was removed after not responding", name),
        )
        .await;

        let paused = self.enforce_player_count(room).await;
        room.touch();
        if paused {
            self.broadcast_room_state(room).await;
            return true;
        }

        self.clear_absence(room, false).await;
        self.broadcast_room_state(room).await;
        self.focus_turn(room).await;
        true
    }
}
