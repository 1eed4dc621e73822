//! Bridges a channel adapter onto the coordinator's transport facade.

use async_trait::async_trait;
use rt_channels::{ChannelAdapter, OutboundMessage, TitleChange, TitleChangeError};
use rt_core::{ApplyError, Notice, RoomId, TitleApplied, TransportFacade};
use std::sync::Arc;

pub struct ChannelTransport {
    channel: Arc<dyn ChannelAdapter>,
}

impl ChannelTransport {
    pub fn new(channel: Arc<dyn ChannelAdapter>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl TransportFacade for ChannelTransport {
    async fn apply_title(&self, room: &RoomId, title: &str) -> Result<TitleApplied, ApplyError> {
        match self.channel.set_title(room.as_str(), title).await {
            Ok(TitleChange::Applied) => Ok(TitleApplied::Applied),
            Ok(TitleChange::Unchanged) => Ok(TitleApplied::Unchanged),
            Err(TitleChangeError::InsufficientPermission(reason)) => {
                Err(ApplyError::InsufficientPermission(reason))
            }
            Err(e) => Err(ApplyError::Transport(e.to_string())),
        }
    }

    async fn notify(&self, room: &RoomId, notice: Notice) -> anyhow::Result<()> {
        let message = render_notice(&notice, self.channel.supports_html());
        self.channel.send(room.as_str(), message).await
    }
}

pub fn render_notice(notice: &Notice, html: bool) -> OutboundMessage {
    match notice {
        Notice::TitleChanged {
            sender_id,
            sender_display_name,
            ..
        } if html => OutboundMessage::html(format!(
            r#"<a href="tg://user?id={}">{}</a> changed the group title!"#,
            escape_html(sender_id),
            escape_html(sender_display_name)
        )),
        Notice::TitleChanged {
            sender_display_name,
            ..
        } => OutboundMessage::plain(format!("{sender_display_name} changed the group title!")),
        Notice::PermissionDenied => OutboundMessage::plain(
            "I can't change the group title here: I need the right to change group info.",
        ),
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}
