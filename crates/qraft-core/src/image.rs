//! Background-image upload validation.
//!
//! The MIME type reported for camera images is unreliable (HEIC files often
//! arrive as `application/octet-stream` or with no type at all), so the
//! extension allow-list acts as a fallback when the MIME check fails.

pub const SUPPORTED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
    "image/heic",
    "image/heif",
    "image/gif",
    "image/bmp",
    "image/tiff",
];

pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".webp", ".heic", ".heif", ".gif", ".bmp", ".tiff",
];

pub fn is_supported_image(file_name: &str, mime_type: &str) -> bool {
    let mime_type = mime_type.trim().to_ascii_lowercase();
    if SUPPORTED_MIME_TYPES.contains(&mime_type.as_str()) {
        return true;
    }

    let file_name = file_name.to_ascii_lowercase();
    SUPPORTED_EXTENSIONS
        .iter()
        .any(|ext| file_name.ends_with(ext))
}

/// True for HEIC/HEIF images, which must be converted before upload.
pub fn is_heic(file_name: &str, mime_type: &str) -> bool {
    let mime_type = mime_type.to_ascii_lowercase();
    let file_name = file_name.to_ascii_lowercase();
    mime_type.contains("heic")
        || mime_type.contains("heif")
        || file_name.ends_with(".heic")
        || file_name.ends_with(".heif")
}

/// Best-effort MIME type from a file name.
pub fn guess_mime(file_name: &str) -> String {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".heic") {
        return "image/heic".into();
    }
    if lower.ends_with(".heif") {
        return "image/heif".into();
    }
    mime_guess::from_path(file_name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Rename `photo.HEIC` to `photo.jpg` after conversion.
pub fn converted_file_name(file_name: &str) -> String {
    let lower = file_name.to_ascii_lowercase();
    for ext in [".heic", ".heif"] {
        if lower.ends_with(ext) {
            return format!("{}.jpg", &file_name[..file_name.len() - ext.len()]);
        }
    }
    file_name.to_string()
}
