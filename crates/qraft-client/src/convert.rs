use std::future::Future;
use std::pin::Pin;

use qraft_core::UploadedImage;
use qraft_core::image::converted_file_name;

use crate::error::ServiceError;

pub const HEIC_CONVERSION_FAILED: &str =
    "Could not convert HEIC image. Please try using a different image format.";

/// Converts camera images the service cannot read into JPEG.
pub trait ImageConverter: Send + Sync {
    fn to_jpeg<'a>(
        &'a self,
        image: &'a UploadedImage,
    ) -> Pin<Box<dyn Future<Output = Result<UploadedImage, ServiceError>> + Send + 'a>>;
}

/// Converter that shells out to libheif's `heif-convert`.
pub struct HeifConvert {
    bin: String,
    quality: u8,
}

impl Default for HeifConvert {
    fn default() -> Self {
        Self::new()
    }
}

impl HeifConvert {
    pub fn new() -> Self {
        Self {
            bin: "heif-convert".into(),
            quality: 90,
        }
    }

    /// Override the path to the heif-convert binary.
    pub fn with_bin(mut self, path: impl Into<String>) -> Self {
        self.bin = path.into();
        self
    }
}

impl ImageConverter for HeifConvert {
    fn to_jpeg<'a>(
        &'a self,
        image: &'a UploadedImage,
    ) -> Pin<Box<dyn Future<Output = Result<UploadedImage, ServiceError>> + Send + 'a>> {
        Box::pin(async move {
            let tmp = tempfile::tempdir()?;
            let input = tmp.path().join("input.heic");
            let output = tmp.path().join("output.jpg");
            tokio::fs::write(&input, &image.bytes).await?;

            let result = tokio::process::Command::new(&self.bin)
                .arg("-q")
                .arg(self.quality.to_string())
                .arg(&input)
                .arg(&output)
                .output()
                .await
                .map_err(|e| {
                    ServiceError::Conversion(format!(
                        "Failed to run {}: {e}. Is libheif installed?",
                        self.bin
                    ))
                })?;

            if !result.status.success() {
                return Err(ServiceError::Conversion(format!(
                    "{} exited with {}: {}",
                    self.bin,
                    result.status,
                    String::from_utf8_lossy(&result.stderr).trim()
                )));
            }

            let bytes = tokio::fs::read(&output).await?;
            Ok(UploadedImage {
                file_name: converted_file_name(&image.file_name),
                mime_type: "image/jpeg".into(),
                bytes,
            })
        })
    }
}

/// Validate an upload and convert it to JPEG if it is HEIC/HEIF.
///
/// The upload cannot proceed until this resolves.
pub async fn normalize_upload(
    image: UploadedImage,
    converter: &dyn ImageConverter,
) -> Result<UploadedImage, ServiceError> {
    image.validate()?;
    if !image.is_heic() {
        return Ok(image);
    }

    tracing::info!(file_name = %image.file_name, "Converting HEIC image to JPEG");
    match converter.to_jpeg(&image).await {
        Ok(converted) => {
            tracing::info!(file_name = %converted.file_name, "HEIC conversion successful");
            Ok(converted)
        }
        Err(e) => {
            tracing::error!("HEIC conversion error: {e}");
            Err(ServiceError::Conversion(HEIC_CONVERSION_FAILED.into()))
        }
    }
}
