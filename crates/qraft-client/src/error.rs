use qraft_core::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Composed message from the service's error body, e.g. `boom: x`.
    #[error("{0}")]
    Remote(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("{0}")]
    Conversion(String),

    /// Failure from the in-process Python runtime.
    #[error("{0}")]
    Runtime(String),

    #[error("a generation request is already in progress")]
    Busy,

    #[error("config error: {0}")]
    Config(String),

    #[error("clipboard error: {0}")]
    Clipboard(String),

    #[error("image decode error: {0}")]
    Image(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}
