//! # Upload Format Validation
//!
//! Uploads are accepted only when the declared MIME type is on the allow-list
//! and, when a filename is supplied, its extension agrees with that type.
//! A mismatch is rejected outright; nothing is guessed or corrected.

use crate::error::{AppError, AppResult};
use std::path::Path;

/// Declared content type → accepted filename extensions.
pub const SUPPORTED_FORMATS: &[(&str, &[&str])] = &[
    ("audio/mpeg", &[".mp3"]),
    ("audio/wav", &[".wav"]),
    ("audio/x-wav", &[".wav"]),
    ("audio/flac", &[".flac"]),
    ("audio/aac", &[".aac"]),
    ("audio/mp4", &[".m4a"]),
    ("audio/ogg", &[".ogg"]),
];

/// Extensions accepted for a content type, `None` when the type is not supported.
pub fn allowed_extensions(content_type: &str) -> Option<&'static [&'static str]> {
    SUPPORTED_FORMATS
        .iter()
        .find(|(mime, _)| *mime == content_type)
        .map(|(_, exts)| *exts)
}

/// Check an upload's declared type and filename against the allow-list.
///
/// ## Rules:
/// - A missing content type is rejected
/// - The content type must be one of [`SUPPORTED_FORMATS`]
/// - If a filename is present, its lowercased extension must be allowed for that type
///
/// Returns the canonical extension (with the dot) for the upload.
pub fn validate_upload(content_type: Option<&str>, filename: Option<&str>) -> AppResult<&'static str> {
    let content_type = content_type
        .ok_or_else(|| AppError::ValidationError("Missing content type".to_string()))?;

    let extensions = allowed_extensions(content_type).ok_or_else(|| {
        AppError::ValidationError(format!("Unsupported file format: {}", content_type))
    })?;

    if let Some(name) = filename {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default();

        return extensions
            .iter()
            .copied()
            .find(|allowed| *allowed == ext)
            .ok_or_else(|| {
                AppError::ValidationError(format!(
                    "File extension '{}' does not match content type {}",
                    ext, content_type
                ))
            });
    }

    Ok(extensions[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_supported_pair_is_accepted() {
        for (mime, exts) in SUPPORTED_FORMATS {
            for ext in exts.iter() {
                let name = format!("track{}", ext);
                assert_eq!(validate_upload(Some(*mime), Some(&name)).unwrap(), *ext);

                let upper = format!("TRACK{}", ext.to_uppercase());
                assert!(validate_upload(Some(*mime), Some(&upper)).is_ok(), "{} {}", mime, upper);
            }
        }
    }

    #[test]
    fn test_mismatched_pairs_are_rejected() {
        for (mime, exts) in SUPPORTED_FORMATS {
            for (_, other_exts) in SUPPORTED_FORMATS {
                for other in other_exts.iter().filter(|e| !exts.contains(*e)) {
                    let name = format!("track{}", other);
                    assert!(validate_upload(Some(*mime), Some(&name)).is_err(), "{} {}", mime, name);
                }
            }
        }
    }

    #[test]
    fn test_unknown_or_missing_type_is_rejected() {
        assert!(validate_upload(Some("audio/x-ms-wma"), Some("a.wma")).is_err());
        assert!(validate_upload(Some("video/mp4"), Some("a.m4a")).is_err());
        assert!(validate_upload(None, Some("a.wav")).is_err());
        assert!(validate_upload(Some("audio/wav"), Some("no_extension")).is_err());
    }

    #[test]
    fn test_missing_filename_uses_canonical_extension() {
        assert_eq!(validate_upload(Some("audio/x-wav"), None).unwrap(), ".wav");
        assert_eq!(validate_upload(Some("audio/mp4"), None).unwrap(), ".m4a");
    }
}
