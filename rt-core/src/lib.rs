//! Room title coordination.
//!
//! Matches chat messages against per-room patterns, composes decorated titles,
//! debounces renames per room and reverts to the original title after an idle
//! period. Talking to the chat service is left to a `TransportFacade`.

mod coordinator;
mod error;
mod format;
mod matcher;
mod revert;
mod room;
mod transport;

#[cfg(test)]
mod testing;

pub use coordinator::{
    DEFAULT_MAX_TITLE_LEN, DEFAULT_MULTI_EDIT_HOLD, DEFAULT_REVERT_AFTER, MatchEvent,
    RenameCoordinator, RenameOutcome, Tunables,
};
pub use error::{ApplyError, ConfigError, RenameError, Result};
pub use format::{Fixup, FixupRule, compose_title, normalize_fragment, title_len};
pub use matcher::PatternSet;
pub use revert::{RevertHandle, RevertScheduler};
pub use room::{Candidate, Room, RoomId, RoomRegistry, RoomSpec, RoomView};
pub use transport::{Notice, TitleApplied, TransportFacade};
