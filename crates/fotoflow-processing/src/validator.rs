//! Upload policy validation.
//!
//! Everything here runs before any database write or storage call: batch
//! shape, per-kind size ceilings, extension/content-type allow-lists, the
//! extension↔content-type cross-check, and (when the bytes are available)
//! the video duration ceiling.

use std::path::Path;

use fotoflow_core::models::MediaKind;
use fotoflow_core::UploadPolicy;

/// Validation errors for upload batches.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Too many files in batch: {count} (max: {max})")]
    TooManyFiles { count: usize, max: usize },

    #[error("Empty batch")]
    EmptyBatch,

    #[error("Empty file: {0}")]
    EmptyFile(String),

    #[error("File too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("Invalid file extension: {extension} (allowed: {allowed:?})")]
    InvalidExtension {
        extension: String,
        allowed: Vec<String>,
    },

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Content type {content_type} does not match extension {extension}")]
    ContentTypeMismatch {
        content_type: String,
        extension: String,
    },

    #[error("Declared kind {declared:?} does not match detected kind {detected:?}")]
    KindMismatch {
        declared: MediaKind,
        detected: MediaKind,
    },

    #[error("Video too long: {secs:.1}s (max: {max:.1}s)")]
    DurationTooLong { secs: f64, max: f64 },
}

/// Detect the media kind from a declared content type. Formats the pipeline
/// does not produce derivatives for (BMP, TIFF, GIF, ...) are rejected here,
/// before any storage write.
pub fn detect_kind(content_type: &str) -> Result<MediaKind, ValidationError> {
    match content_type.to_lowercase().as_str() {
        "image/jpeg" | "image/jpg" | "image/png" | "image/webp" => Ok(MediaKind::Image),
        "video/mp4" | "video/webm" | "video/quicktime" => Ok(MediaKind::Video),
        other => Err(ValidationError::UnsupportedContentType(other.to_string())),
    }
}

/// File extension a scratch copy of this content type should carry.
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type.to_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        _ => "bin",
    }
}

/// Upload batch validator, parameterized by policy so tests can exercise
/// boundary values directly.
pub struct UploadValidator {
    policy: UploadPolicy,
}

impl UploadValidator {
    pub fn new(policy: UploadPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    pub fn validate_batch_shape(&self, count: usize) -> Result<(), ValidationError> {
        if count == 0 {
            return Err(ValidationError::EmptyBatch);
        }
        if count > self.policy.max_files_per_batch {
            return Err(ValidationError::TooManyFiles {
                count,
                max: self.policy.max_files_per_batch,
            });
        }
        Ok(())
    }

    /// Validate one file's metadata and return its detected kind.
    pub fn validate_file(
        &self,
        file_name: &str,
        content_type: &str,
        size: u64,
    ) -> Result<MediaKind, ValidationError> {
        let kind = detect_kind(content_type)?;

        if size == 0 {
            return Err(ValidationError::EmptyFile(file_name.to_string()));
        }
        let max = match kind {
            MediaKind::Image => self.policy.image_max_bytes,
            MediaKind::Video => self.policy.video_max_bytes,
        };
        if size > max {
            return Err(ValidationError::FileTooLarge { size, max });
        }

        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .ok_or_else(|| ValidationError::InvalidFilename(file_name.to_string()))?;

        let allowed = match kind {
            MediaKind::Image => &self.policy.image_allowed_extensions,
            MediaKind::Video => &self.policy.video_allowed_extensions,
        };
        if !allowed.contains(&extension) {
            return Err(ValidationError::InvalidExtension {
                extension,
                allowed: allowed.clone(),
            });
        }

        self.validate_extension_content_type_match(&extension, content_type)?;

        Ok(kind)
    }

    /// Cross-check the declared content type against the file extension so a
    /// mislabeled file cannot slip through with a legitimate content type.
    fn validate_extension_content_type_match(
        &self,
        extension: &str,
        content_type: &str,
    ) -> Result<(), ValidationError> {
        let normalized = content_type.to_lowercase();
        let expected: &[&str] = match extension {
            "jpg" | "jpeg" => &["image/jpeg", "image/jpg"],
            "png" => &["image/png"],
            "webp" => &["image/webp"],
            "mp4" => &["video/mp4"],
            "webm" => &["video/webm"],
            "mov" => &["video/quicktime"],
            _ => return Ok(()),
        };
        if !expected.contains(&normalized.as_str()) {
            return Err(ValidationError::ContentTypeMismatch {
                content_type: content_type.to_string(),
                extension: extension.to_string(),
            });
        }
        Ok(())
    }

    /// Duration ceiling for video, checked against the probed value of the
    /// actual bytes (not the client's self-reported metadata).
    pub fn validate_duration(&self, secs: f64) -> Result<(), ValidationError> {
        if secs > self.policy.video_max_duration_secs {
            return Err(ValidationError::DurationTooLong {
                secs,
                max: self.policy.video_max_duration_secs,
            });
        }
        Ok(())
    }
}
