//! Shared key generation for storage backends.
//!
//! Originals: `{owner_id}/{uuid}.{ext}`. Derivatives:
//! `{media_id}/{generation}/{variant}`. The generation component makes
//! re-processing an idempotent overwrite at the item level while keeping each
//! run's outputs internally consistent.

use uuid::Uuid;

/// Derivative slots a processing run can fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivativeVariant {
    /// 640 px bounding box; also the video thumbnail slot.
    Small,
    /// 1080 px bounding box.
    Medium,
    /// 1920 px bounding box.
    Large,
    /// Transcoded playback rendition.
    Playback,
    /// Short silent preview clip.
    Preview,
}

impl DerivativeVariant {
    pub fn file_name(&self) -> &'static str {
        match self {
            DerivativeVariant::Small => "small.jpg",
            DerivativeVariant::Medium => "medium.jpg",
            DerivativeVariant::Large => "large.jpg",
            DerivativeVariant::Playback => "playback.mp4",
            DerivativeVariant::Preview => "preview.mp4",
        }
    }
}

/// Mint a key for an original upload in the private namespace.
pub fn source_key(owner_id: i64, extension: &str) -> String {
    format!("{}/{}.{}", owner_id, Uuid::new_v4(), extension)
}

/// Key for one derivative of one processing generation.
pub fn derivative_key(media_id: i64, generation: Uuid, variant: DerivativeVariant) -> String {
    format!("{}/{}/{}", media_id, generation, variant.file_name())
}
