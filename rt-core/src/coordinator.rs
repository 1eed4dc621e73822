//! Per-room rename state machine.
//!
//! `attempt_rename` runs match → compose → gate → apply → schedule revert.
//! The gate is a non-blocking try-acquire: an attempt that finds it held is
//! dropped, never queued. After a successful rename the gate stays held for the
//! multi-edit window, which is what debounces bursts of matching messages.

use crate::error::{ApplyError, RenameError, Result};
use crate::revert::RevertScheduler;
use crate::room::{Room, RoomId, RoomRegistry, RoomState, RoomView};
use crate::transport::{Notice, TitleApplied, TransportFacade};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MULTI_EDIT_HOLD: Duration = Duration::from_secs(80);
pub const DEFAULT_REVERT_AFTER: Duration = Duration::from_secs(2 * 60 * 60);
pub const DEFAULT_MAX_TITLE_LEN: usize = 128;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tunables {
    pub multi_edit_hold: Duration,
    pub revert_after: Duration,
    pub max_title_len: usize,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            multi_edit_hold: DEFAULT_MULTI_EDIT_HOLD,
            revert_after: DEFAULT_REVERT_AFTER,
            max_title_len: DEFAULT_MAX_TITLE_LEN,
        }
    }
}

/// A text message seen in some room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchEvent {
    pub room_id: RoomId,
    pub raw_text: String,
    pub sender_id: String,
    pub sender_display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    /// Title applied (or already equal) and a revert scheduled.
    Renamed { title: String, unchanged: bool },
    /// The room is not managed.
    Unmanaged,
    NoMatch,
    TooLong { len: usize },
    /// Another rename holds the room gate.
    Busy,
    /// The transport lacks rights to change the title; a notice was sent.
    PermissionDenied,
}

pub struct RenameCoordinator {
    rooms: RoomRegistry,
    transport: Arc<dyn TransportFacade>,
    scheduler: RevertScheduler,
    tunables: Tunables,
    shutdown: CancellationToken,
}

impl RenameCoordinator {
    pub fn new(rooms: RoomRegistry, transport: Arc<dyn TransportFacade>, tunables: Tunables) -> Self {
        let shutdown = CancellationToken::new();
        let scheduler = RevertScheduler::new(transport.clone(), shutdown.clone());
        Self {
            rooms,
            transport,
            scheduler,
            tunables,
            shutdown,
        }
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    pub fn tunables(&self) -> Tunables {
        self.tunables
    }

    pub fn room_view(&self, room_id: &RoomId) -> Option<RoomView> {
        self.rooms.get(room_id).map(|room| room.view())
    }

    #[tracing::instrument(
        level = "info",
        skip_all,
        fields(room = %event.room_id, sender = %event.sender_id)
    )]
    pub async fn attempt_rename(&self, event: &MatchEvent) -> Result<RenameOutcome> {
        let Some(room) = self.rooms.get(&event.room_id) else {
            tracing::debug!("ignoring message from unmanaged room");
            return Ok(RenameOutcome::Unmanaged);
        };
        let spec = room.spec();

        // Lock-free snapshot; re-validated under the gate below.
        let snapshot = room.view().fragments;
        let Some(candidate) = spec.candidate(&snapshot, &event.raw_text) else {
            return Ok(RenameOutcome::NoMatch);
        };
        tracing::info!(
            sender_name = %event.sender_display_name,
            title = %candidate.title,
            "title change requested"
        );

        if candidate.char_len() > self.tunables.max_title_len {
            tracing::info!(
                len = candidate.char_len(),
                max = self.tunables.max_title_len,
                "not changing title: new title is too long"
            );
            return Ok(RenameOutcome::TooLong {
                len: candidate.char_len(),
            });
        }

        let Some(mut gate) = room.try_acquire() else {
            tracing::info!("not changing title: rename gate already held");
            return Ok(RenameOutcome::Busy);
        };
        // `shutdown` cancels before visiting the gates, so a commit past this
        // check is always seen by it.
        if self.shutdown.is_cancelled() {
            tracing::info!("not changing title: shutting down");
            return Ok(RenameOutcome::Busy);
        }

        let current = gate.fragments();
        let candidate = if current == snapshot {
            candidate
        } else {
            match spec.candidate(&current, &event.raw_text) {
                Some(candidate) => candidate,
                None => return Ok(RenameOutcome::NoMatch),
            }
        };
        if candidate.char_len() > self.tunables.max_title_len {
            tracing::info!(
                len = candidate.char_len(),
                "not changing title: fragments grew while acquiring the gate"
            );
            return Ok(RenameOutcome::TooLong {
                len: candidate.char_len(),
            });
        }

        tracing::info!(title = %candidate.title, "changing room title");
        let applied = match self.transport.apply_title(room.id(), &candidate.title).await {
            Ok(applied) => applied,
            Err(ApplyError::InsufficientPermission(reason)) => {
                drop(gate);
                tracing::warn!(%reason, "cannot change room title: insufficient permission");
                self.notify(room.id(), Notice::PermissionDenied).await;
                return Ok(RenameOutcome::PermissionDenied);
            }
            Err(source) => {
                drop(gate);
                return Err(RenameError::Transport {
                    room: room.id().to_string(),
                    source,
                });
            }
        };

        if let Some(previous) = gate.take_pending() {
            tracing::info!(generation = previous.generation(), "cancelling previous revert");
            previous.cancel();
        }
        let revert = self
            .scheduler
            .schedule(room.clone(), self.tunables.revert_after);
        tracing::info!(
            generation = revert.generation(),
            revert_after = ?self.tunables.revert_after,
            "scheduled revert"
        );
        let title = candidate.title;
        gate.commit(candidate.fragments, revert);

        self.notify(
            room.id(),
            Notice::TitleChanged {
                sender_id: event.sender_id.clone(),
                sender_display_name: event.sender_display_name.clone(),
                title: title.clone(),
            },
        )
        .await;

        self.hold_gate(room, gate);
        Ok(RenameOutcome::Renamed {
            title,
            unchanged: applied == TitleApplied::Unchanged,
        })
    }

    /// Keeps the gate held for the multi-edit window on a background task.
    fn hold_gate(&self, room: &Arc<Room>, gate: OwnedMutexGuard<RoomState>) {
        let hold = self.tunables.multi_edit_hold;
        let shutdown = self.shutdown.child_token();
        let room_id = room.id().clone();
        tracing::info!(?hold, "holding rename gate");
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(hold) => {}
            }
            drop(gate);
            tracing::debug!(room = %room_id, "rename gate released");
        });
    }

    async fn notify(&self, room_id: &RoomId, notice: Notice) {
        if let Err(e) = self.transport.notify(room_id, notice).await {
            tracing::warn!(error = %e, room = %room_id, "failed to send room notice");
        }
    }

    /// Cancels every pending revert and releases held gates. Titles are left
    /// as they are.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut pending = Vec::new();
        for room in self.rooms.iter() {
            let handle = room.acquire().await.take_pending();
            if let Some(handle) = handle {
                tracing::info!(
                    room = %room.id(),
                    generation = handle.generation(),
                    "cancelling pending revert for shutdown"
                );
                pending.push(handle.cancel_and_join(SHUTDOWN_GRACE));
            }
        }
        futures_util::future::join_all(pending).await;
    }
}
