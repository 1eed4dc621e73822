//! Inbound dispatch: every channel message becomes a rename attempt on its own
//! task.

use anyhow::Result;
use rt_channels::InboundMessage;
use rt_core::{MatchEvent, RenameCoordinator, RenameOutcome, RoomId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

pub struct Gateway {
    coordinator: Arc<RenameCoordinator>,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<InboundMessage>>,
}

impl Gateway {
    pub fn new(coordinator: Arc<RenameCoordinator>, inbound_rx: mpsc::Receiver<InboundMessage>) -> Self {
        Self {
            coordinator,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
        }
    }

    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run_loop(shutdown).await {
                tracing::error!(%e, "gateway loop exited");
            }
        })
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn run_loop(&self, shutdown: CancellationToken) -> Result<()> {
        let mut in_flight = JoinSet::new();
        let mut rx = self.inbound_rx.lock().await;
        loop {
            let msg = tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("gateway received shutdown signal");
                    break;
                }
                msg = rx.recv() => msg,
            };
            let Some(inbound) = msg else {
                tracing::info!("inbound queue closed");
                break;
            };

            let coordinator = self.coordinator.clone();
            in_flight.spawn(async move { handle_inbound(&coordinator, inbound).await });
            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    tracing::warn!(error = %e, "rename task join failed");
                }
            }
        }
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "rename task join failed");
            }
        }
        Ok(())
    }
}

pub fn match_event(inbound: &InboundMessage) -> MatchEvent {
    MatchEvent {
        room_id: RoomId::from(inbound.chat_id.as_str()),
        raw_text: inbound.content.clone(),
        sender_id: inbound.sender_id.to_string(),
        sender_display_name: inbound.sender_display_name().to_string(),
    }
}

#[tracing::instrument(level = "debug", skip_all, fields(chat = %inbound.chat_id, message = %inbound.message_id))]
async fn handle_inbound(coordinator: &RenameCoordinator, inbound: InboundMessage) -> Option<RenameOutcome> {
    if !inbound.is_group {
        return None;
    }
    let event = match_event(&inbound);
    match coordinator.attempt_rename(&event).await {
        Ok(outcome) => {
            if !matches!(outcome, RenameOutcome::Unmanaged | RenameOutcome::NoMatch) {
                tracing::info!(
                    sender = %event.sender_display_name,
                    room = %event.room_id,
                    "{} in {} requested a title change",
                    event.sender_display_name,
                    event.room_id
                );
            }
            match &outcome {
                RenameOutcome::Renamed { title, unchanged } => {
                    tracing::info!(%title, unchanged, "room renamed");
                }
                RenameOutcome::Unmanaged | RenameOutcome::NoMatch => {}
                other => tracing::debug!(outcome = ?other, "rename not applied"),
            }
            Some(outcome)
        }
        Err(e) => {
            tracing::error!(error = %e, "rename failed");
            None
        }
    }
}
