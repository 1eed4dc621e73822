use thiserror::Error;

#[derive(Debug, Error)]
pub enum TitleChangeError {
    #[error("insufficient permission: {0}")]
    InsufficientPermission(String),

    #[error("channel {0} does not support chat titles")]
    Unsupported(String),

    #[error("api error: status={status} description={description}")]
    Api { status: u16, description: String },

    #[error("http error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for TitleChangeError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}
