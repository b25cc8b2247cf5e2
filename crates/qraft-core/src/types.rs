use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::image;

/// Scale sent by the generation form to the remote service.
pub const DEFAULT_SCALE: u32 = 48;

/// Image format requested from the renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum OutputKind {
    #[default]
    Png,
    Jpg,
    Gif,
}

impl OutputKind {
    /// Lenient parse: `jpg`/`jpeg` and `gif` are recognised, anything else is PNG.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Self::Jpg,
            "gif" => Self::Gif,
            _ => Self::Png,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg => "jpg",
            Self::Gif => "gif",
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpg => "image/jpeg",
            Self::Gif => "image/gif",
        }
    }

    /// Upper-case label used in human-readable descriptions.
    pub fn label(self) -> &'static str {
        match self {
            Self::Png => "PNG",
            Self::Jpg => "JPG",
            Self::Gif => "GIF",
        }
    }
}

impl From<String> for OutputKind {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<&str> for OutputKind {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A background image supplied as raw file bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedImage {
    /// Build an upload, guessing the MIME type from the file name when the
    /// caller does not know it.
    pub fn new(file_name: impl Into<String>, mime_type: Option<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime_type = mime_type
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| image::guess_mime(&file_name));
        Self {
            file_name,
            mime_type,
            bytes,
        }
    }

    /// Check the upload against the MIME and extension allow-lists.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if image::is_supported_image(&self.file_name, &self.mime_type) {
            Ok(())
        } else {
            Err(ValidationError::UnsupportedImage(self.file_name.clone()))
        }
    }

    pub fn is_heic(&self) -> bool {
        image::is_heic(&self.file_name, &self.mime_type)
    }
}

// Image bytes are noise in logs.
impl std::fmt::Debug for UploadedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedImage")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Where the background image for an artistic QR code comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ImageSource {
    #[default]
    None,
    Upload(UploadedImage),
    Url(String),
}

impl ImageSource {
    /// Resolve the form's two background inputs into one source.
    ///
    /// A non-blank URL takes precedence over an uploaded file.
    pub fn resolve(upload: Option<UploadedImage>, url: Option<&str>) -> Self {
        match (url.map(str::trim).filter(|u| !u.is_empty()), upload) {
            (Some(url), _) => Self::Url(url.to_string()),
            (None, Some(upload)) => Self::Upload(upload),
            (None, None) => Self::None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// One user generation action. Built fresh per action, not retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub content: String,
    pub scale: u32,
    pub kind: OutputKind,
    pub image: ImageSource,
}

impl GenerationRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            scale: DEFAULT_SCALE,
            kind: OutputKind::default(),
            image: ImageSource::None,
        }
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_kind(mut self, kind: OutputKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_image(mut self, image: ImageSource) -> Self {
        self.image = image;
        self
    }

    /// Reject empty or whitespace-only content before any call is made.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.content.trim().is_empty() {
            return Err(ValidationError::EmptyContent);
        }
        if let ImageSource::Upload(upload) = &self.image {
            upload.validate()?;
        }
        Ok(())
    }
}

/// A generated QR image. `url` is either an HTTP URL or a data URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl GenerationResult {
    /// Append a `#cb=<millis>` fragment unless the URL already carries one,
    /// so an image viewer never shows a stale copy of a previous result.
    pub fn with_cache_buster(mut self, now_millis: i64) -> Self {
        if !self.url.contains('#') {
            self.url = format!("{}#cb={now_millis}", self.url);
        }
        self
    }

    /// [`with_cache_buster`](Self::with_cache_buster) using the wall clock.
    pub fn cache_busted(self) -> Self {
        self.with_cache_buster(chrono::Utc::now().timestamp_millis())
    }

    pub fn is_data_uri(&self) -> bool {
        self.url.starts_with("data:")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_kind_media_types() {
        assert_eq!(OutputKind::parse("jpg").media_type(), "image/jpeg");
        assert_eq!(OutputKind::parse("JPEG").media_type(), "image/jpeg");
        assert_eq!(OutputKind::parse("gif").media_type(), "image/gif");
        assert_eq!(OutputKind::parse("png").media_type(), "image/png");
        assert_eq!(OutputKind::parse("webp").media_type(), "image/png");
        assert_eq!(OutputKind::parse("").media_type(), "image/png");
        assert_eq!(OutputKind::default().media_type(), "image/png");
    }

    #[test]
    fn output_kind_deserializes_leniently() {
        let kind: OutputKind = serde_json::from_str("\"jpeg\"").unwrap();
        assert_eq!(kind, OutputKind::Jpg);
        let kind: OutputKind = serde_json::from_str("\"bmp\"").unwrap();
        assert_eq!(kind, OutputKind::Png);
    }

    #[test]
    fn url_wins_over_upload() {
        let upload = UploadedImage::new("bg.png", None, vec![1, 2, 3]);
        let source = ImageSource::resolve(Some(upload.clone()), Some("https://x.test/a.jpg"));
        assert_eq!(source, ImageSource::Url("https://x.test/a.jpg".into()));

        let source = ImageSource::resolve(Some(upload.clone()), Some("   "));
        assert_eq!(source, ImageSource::Upload(upload));

        assert!(ImageSource::resolve(None, None).is_none());
    }

    #[test]
    fn blank_content_is_rejected() {
        assert_eq!(
            GenerationRequest::new("  \n\t").validate(),
            Err(ValidationError::EmptyContent)
        );
        assert!(GenerationRequest::new("hello world").validate().is_ok());
    }

    #[test]
    fn unsupported_upload_is_rejected() {
        let upload = UploadedImage::new("notes.txt", Some("text/plain".into()), vec![]);
        let request = GenerationRequest::new("x").with_image(ImageSource::Upload(upload));
        assert!(matches!(
            request.validate(),
            Err(ValidationError::UnsupportedImage(name)) if name == "notes.txt"
        ));
    }

    #[test]
    fn cache_buster_only_added_once() {
        let result = GenerationResult {
            url: "https://x.test/qr.png".into(),
            content: String::new(),
            description: None,
        };
        let busted = result.with_cache_buster(42);
        assert_eq!(busted.url, "https://x.test/qr.png#cb=42");

        let again = busted.with_cache_buster(43);
        assert_eq!(again.url, "https://x.test/qr.png#cb=42");
    }

    #[test]
    fn result_parses_without_optional_fields() {
        let result: GenerationResult =
            serde_json::from_str(r#"{"url":"data:image/png;base64,AA=="}"#).unwrap();
        assert!(result.is_data_uri());
        assert_eq!(result.content, "");
        assert_eq!(result.description, None);
    }
}
