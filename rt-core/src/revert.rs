//! Idle-timeout reverts back to a room's original title.

use crate::error::ApplyError;
use crate::room::Room;
use crate::transport::{TitleApplied, TransportFacade};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to one scheduled revert. Cancellation is advisory: a revert that has
/// already fired ignores it.
#[derive(Debug)]
pub struct RevertHandle {
    generation: u64,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl RevertHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[cfg(test)]
    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    #[cfg(test)]
    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancels the revert and waits up to `grace` for its task to exit.
    pub async fn cancel_and_join(self, grace: Duration) {
        self.token.cancel();
        match tokio::time::timeout(grace, self.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(error = %e, generation = self.generation, "revert task join failed");
            }
            Err(_) => {
                tracing::warn!(
                    generation = self.generation,
                    "timed out waiting for revert task shutdown"
                );
            }
        }
    }
}

#[derive(Clone)]
pub struct RevertScheduler {
    transport: Arc<dyn TransportFacade>,
    shutdown: CancellationToken,
    next_generation: Arc<AtomicU64>,
}

impl RevertScheduler {
    pub fn new(transport: Arc<dyn TransportFacade>, shutdown: CancellationToken) -> Self {
        Self {
            transport,
            shutdown,
            next_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Arms a revert of `room` after `delay`. The caller must store the handle
    /// as the room's pending revert before releasing the gate.
    pub fn schedule(&self, room: Arc<Room>, delay: Duration) -> RevertHandle {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let token = self.shutdown.child_token();
        let task = tokio::spawn(run_revert(
            room,
            self.transport.clone(),
            token.clone(),
            generation,
            delay,
        ));
        RevertHandle {
            generation,
            token,
            task,
        }
    }
}

#[tracing::instrument(level = "info", skip(room, transport, token), fields(room = %room.id()))]
async fn run_revert(
    room: Arc<Room>,
    transport: Arc<dyn TransportFacade>,
    token: CancellationToken,
    generation: u64,
    delay: Duration,
) {
    tokio::select! {
        _ = token.cancelled() => {
            tracing::debug!("revert cancelled before expiry");
            return;
        }
        _ = tokio::time::sleep(delay) => {}
    }

    let mut state = room.acquire().await;
    // A rename may have superseded this revert while it waited for the gate.
    if token.is_cancelled() || state.pending_generation() != Some(generation) {
        tracing::debug!("revert superseded while waiting for the rename gate");
        return;
    }

    let original = room.spec().original_title();
    match transport.apply_title(room.id(), original).await {
        Ok(TitleApplied::Applied) => {
            tracing::info!(title = %original, "reverted room title");
        }
        Ok(TitleApplied::Unchanged) => {
            tracing::info!(title = %original, "room title already original");
        }
        Err(ApplyError::InsufficientPermission(reason)) => {
            tracing::warn!(%reason, "cannot revert room title: insufficient permission");
        }
        Err(error @ ApplyError::Transport(_)) => {
            tracing::error!(%error, "revert of room title failed");
        }
    }
    state.reset();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Fixup;
    use crate::matcher::PatternSet;
    use crate::room::RoomSpec;
    use crate::testing::RecordingTransport;

    fn room() -> Arc<Room> {
        Arc::new(Room::new(
            RoomSpec::new(
                "room-1",
                "Original",
                " & ",
                PatternSet::compile(&[r"x (.+)"]).expect("compile"),
                Fixup::identity(),
            )
            .expect("spec"),
        ))
    }

    async fn arm(
        scheduler: &RevertScheduler,
        room: &Arc<Room>,
        fragments: &[&str],
        delay: Duration,
    ) -> u64 {
        let handle = scheduler.schedule(room.clone(), delay);
        let generation = handle.generation();
        let mut state = room.acquire().await;
        state.commit(fragments.iter().map(|f| f.to_string()).collect(), handle);
        generation
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn fires_once_and_clears_state() {
        let transport = Arc::new(RecordingTransport::default());
        let scheduler = RevertScheduler::new(transport.clone(), CancellationToken::new());
        let room = room();
        arm(&scheduler, &room, &["Cats"], Duration::from_secs(60)).await;
        assert!(room.view().revert_pending);

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(transport.applied().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(transport.applied(), vec![("room-1".to_string(), "Original".to_string())]);
        assert_eq!(room.view(), crate::room::RoomView::default());

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(transport.applied().len(), 1);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn cancelled_revert_never_applies() {
        let transport = Arc::new(RecordingTransport::default());
        let scheduler = RevertScheduler::new(transport.clone(), CancellationToken::new());
        let room = room();
        arm(&scheduler, &room, &["Cats"], Duration::from_secs(60)).await;

        let handle = room.acquire().await.take_pending().expect("pending");
        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(transport.applied().is_empty());
        assert!(handle.is_finished());
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn revert_waits_for_gate_and_honours_late_cancel() {
        let transport = Arc::new(RecordingTransport::default());
        let scheduler = RevertScheduler::new(transport.clone(), CancellationToken::new());
        let room = room();
        arm(&scheduler, &room, &["Cats"], Duration::from_secs(10)).await;

        let mut gate = room.try_acquire().expect("gate free");
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(transport.applied().is_empty(), "revert must wait for the gate");

        // Cancel arrives after expiry, while the revert is queued on the gate.
        let previous = gate.take_pending().expect("pending");
        previous.cancel();
        drop(gate);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(transport.applied().is_empty());
        assert!(previous.is_finished());
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn failed_revert_still_clears_state() {
        let transport = Arc::new(RecordingTransport::default());
        transport.push_result(Err(ApplyError::Transport("boom".to_string())));
        let scheduler = RevertScheduler::new(transport.clone(), CancellationToken::new());
        let room = room();
        arm(&scheduler, &room, &["Cats", "Dogs"], Duration::from_secs(5)).await;

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(transport.applied().len(), 1);
        assert!(room.view().fragments.is_empty());
        assert!(!room.view().revert_pending);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn shutdown_token_cancels_pending_reverts() {
        let transport = Arc::new(RecordingTransport::default());
        let shutdown = CancellationToken::new();
        let scheduler = RevertScheduler::new(transport.clone(), shutdown.clone());
        let room = room();
        arm(&scheduler, &room, &["Cats"], Duration::from_secs(60)).await;

        shutdown.cancel();
        let handle = room.acquire().await.take_pending().expect("pending");
        handle.cancel_and_join(Duration::from_secs(1)).await;

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(transport.applied().is_empty());
    }

    #[tokio::test]
    async fn generations_increase() {
        let scheduler = RevertScheduler::new(
            Arc::new(RecordingTransport::default()),
            CancellationToken::new(),
        );
        let room = room();
        let first = scheduler.schedule(room.clone(), Duration::from_secs(1));
        let second = scheduler.schedule(room, Duration::from_secs(1));
        assert!(second.generation() > first.generation());
        first.cancel();
        second.cancel();
    }
}
