use thiserror::Error;

pub type Result<T> = std::result::Result<T, RenameError>;

/// Rejected room or pattern definitions, raised while building the registry.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("pattern {pattern:?} must have exactly one capture group, found {found}")]
    CaptureGroups { pattern: String, found: usize },

    #[error("invalid fixup rule: {0}")]
    InvalidFixup(String),

    #[error("room {0} has no patterns")]
    NoPatterns(String),

    #[error("room {0} is defined more than once")]
    DuplicateRoom(String),

    #[error("room {room}: {message}")]
    InvalidRoom { room: String, message: String },
}

/// Failure reported by the transport when applying a title.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error("insufficient permission: {0}")]
    InsufficientPermission(String),

    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum RenameError {
    #[error("apply title to {room}: {source}")]
    Transport {
        room: String,
        #[source]
        source: ApplyError,
    },
}
