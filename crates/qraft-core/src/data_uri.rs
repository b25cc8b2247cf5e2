use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::error::ValidationError;

/// A decoded `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// Build `data:<media_type>;base64,<payload>`.
pub fn encode(media_type: &str, bytes: &[u8]) -> String {
    format!("data:{media_type};base64,{}", STANDARD.encode(bytes))
}

/// Decode a base64 `data:` URI, ignoring any trailing `#fragment`.
pub fn decode(uri: &str) -> Result<DataUri, ValidationError> {
    let malformed = |why: &str| ValidationError::MalformedDataUri(why.to_string());

    let rest = uri.strip_prefix("data:").ok_or_else(|| malformed("missing data: prefix"))?;
    let rest = rest.split_once('#').map_or(rest, |(body, _)| body);
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| malformed("missing ',' separator"))?;
    let media_type = header
        .strip_suffix(";base64")
        .ok_or_else(|| malformed("only base64 payloads are supported"))?;

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| ValidationError::MalformedDataUri(e.to_string()))?;

    Ok(DataUri {
        media_type: if media_type.is_empty() {
            "text/plain".into()
        } else {
            media_type.to_string()
        },
        bytes,
    })
}
