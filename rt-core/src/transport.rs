use crate::error::ApplyError;
use crate::room::RoomId;
use async_trait::async_trait;

/// Successful title applications. `Unchanged` means the room already carried
/// the requested title.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleApplied {
    Applied,
    Unchanged,
}

/// User-visible notices the coordinator asks the transport to deliver. The
/// transport decides how to render them for its platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    TitleChanged {
        sender_id: String,
        sender_display_name: String,
        title: String,
    },
    PermissionDenied,
}

#[async_trait]
pub trait TransportFacade: Send + Sync {
    /// Sets the display title of `room`.
    async fn apply_title(&self, room: &RoomId, title: &str) -> Result<TitleApplied, ApplyError>;

    /// Best-effort notice to the room. Errors are logged by the caller and
    /// never roll back a committed rename.
    async fn notify(&self, room: &RoomId, notice: Notice) -> anyhow::Result<()>;
}
