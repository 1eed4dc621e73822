//! Channel adapters for retitle.
//!
//! Adapters are pure I/O: they convert platform messages to `InboundMessage`,
//! deliver `OutboundMessage`s and change chat titles.

mod error;
mod telegram;
mod traits;
mod types;

pub use error::TitleChangeError;
pub use telegram::TelegramAdapter;
pub use traits::ChannelAdapter;
pub use types::{
    ChannelId, ChatId, InboundMessage, MessageFormat, MessageId, OutboundMessage, SenderId,
    TitleChange,
};
