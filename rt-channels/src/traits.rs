use crate::error::TitleChangeError;
use crate::types::{InboundMessage, OutboundMessage, TitleChange};
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Unique channel identifier: "telegram".
    fn channel_id(&self) -> &str;

    /// Start receiving messages. Push to tx for each inbound message.
    async fn start(&self, tx: mpsc::Sender<InboundMessage>) -> Result<()>;

    /// Send a message to a chat on this platform.
    async fn send(&self, chat_id: &str, message: OutboundMessage) -> Result<()>;

    /// Change the display title of a chat.
    async fn set_title(
        &self,
        _chat_id: &str,
        _title: &str,
    ) -> std::result::Result<TitleChange, TitleChangeError> {
        Err(TitleChangeError::Unsupported(self.channel_id().to_string()))
    }

    fn supports_titles(&self) -> bool {
        false
    }

    fn supports_html(&self) -> bool {
        false
    }
}
