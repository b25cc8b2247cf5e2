use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("QR code content is empty")]
    EmptyContent,

    #[error("unsupported image file: {0}")]
    UnsupportedImage(String),

    #[error("malformed data URI: {0}")]
    MalformedDataUri(String),
}
