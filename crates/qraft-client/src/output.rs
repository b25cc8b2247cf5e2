//! Getting a generated image out of a result URL: fetching, saving, copying.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::time::Duration;

use qraft_core::{UploadedImage, data_uri};

use crate::error::ServiceError;

pub const DEFAULT_FILE_NAME: &str = "qr-code-result.png";

/// Timeout for fetching a remote background image.
pub const BACKGROUND_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetch the bytes behind a result URL. `data:` URIs are decoded locally.
pub async fn fetch_image(http: &reqwest::Client, url: &str) -> Result<Vec<u8>, ServiceError> {
    if url.starts_with("data:") {
        return Ok(data_uri::decode(url)?.bytes);
    }

    let resp = http.get(url).send().await?;
    if !resp.status().is_success() {
        return Err(ServiceError::Network(format!(
            "fetching {url} returned {}",
            resp.status()
        )));
    }
    Ok(resp.bytes().await?.to_vec())
}

/// Save the image behind `url` to `path`.
pub async fn download(
    http: &reqwest::Client,
    url: &str,
    path: &Path,
) -> Result<PathBuf, ServiceError> {
    let bytes = fetch_image(http, url).await?;
    tokio::fs::write(path, &bytes).await?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "QR code saved");
    Ok(path.to_path_buf())
}

/// Decode encoded image bytes and place them on the system clipboard.
pub fn copy_to_clipboard(encoded: &[u8]) -> Result<(), ServiceError> {
    let rgba = image::load_from_memory(encoded)
        .map_err(|e| ServiceError::Image(e.to_string()))?
        .to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut clipboard =
        arboard::Clipboard::new().map_err(|e| ServiceError::Clipboard(e.to_string()))?;
    clipboard
        .set_image(arboard::ImageData {
            width: width as usize,
            height: height as usize,
            bytes: Cow::Owned(rgba.into_raw()),
        })
        .map_err(|e| ServiceError::Clipboard(e.to_string()))?;

    tracing::info!(width, height, "QR code copied to clipboard");
    Ok(())
}

/// Fetch a remote background image so it can be embedded as an upload.
pub async fn fetch_background(url: &str) -> Result<UploadedImage, ServiceError> {
    let http = reqwest::Client::builder()
        .timeout(BACKGROUND_FETCH_TIMEOUT)
        .build()?;

    let resp = http.get(url).send().await.map_err(|e| {
        ServiceError::Network(format!("Failed to fetch background image from URL: {e}"))
    })?;
    if !resp.status().is_success() {
        return Err(ServiceError::Network(format!(
            "Failed to fetch background image from URL: {}",
            resp.status()
        )));
    }

    let mime_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
    let file_name = background_file_name(url);
    let bytes = resp.bytes().await?.to_vec();

    Ok(UploadedImage::new(file_name, mime_type, bytes))
}

fn background_file_name(url: &str) -> String {
    url.split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .unwrap_or("background")
        .to_string()
}
