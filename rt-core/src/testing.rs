use crate::error::ApplyError;
use crate::room::RoomId;
use crate::transport::{Notice, TitleApplied, TransportFacade};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Transport double that records every call and replays scripted results.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    applied: Mutex<Vec<(String, String)>>,
    notices: Mutex<Vec<(String, Notice)>>,
    scripted: Mutex<VecDeque<Result<TitleApplied, ApplyError>>>,
}

impl RecordingTransport {
    pub(crate) fn push_result(&self, result: Result<TitleApplied, ApplyError>) {
        self.scripted.lock().expect("scripted lock").push_back(result);
    }

    pub(crate) fn applied(&self) -> Vec<(String, String)> {
        self.applied.lock().expect("applied lock").clone()
    }

    pub(crate) fn titles(&self) -> Vec<String> {
        self.applied().into_iter().map(|(_, title)| title).collect()
    }

    pub(crate) fn notices(&self) -> Vec<(String, Notice)> {
        self.notices.lock().expect("notices lock").clone()
    }
}

#[async_trait]
impl TransportFacade for RecordingTransport {
    async fn apply_title(&self, room: &RoomId, title: &str) -> Result<TitleApplied, ApplyError> {
        self.applied
            .lock()
            .expect("applied lock")
            .push((room.to_string(), title.to_string()));
        let scripted = self.scripted.lock().expect("scripted lock").pop_front();
        // Suspend like a real network call so concurrent attempts interleave.
        tokio::task::yield_now().await;
        scripted.unwrap_or(Ok(TitleApplied::Applied))
    }

    async fn notify(&self, room: &RoomId, notice: Notice) -> anyhow::Result<()> {
        self.notices
            .lock()
            .expect("notices lock")
            .push((room.to_string(), notice));
        Ok(())
    }
}
