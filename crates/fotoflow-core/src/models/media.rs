use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

/// Media kind, fixed at creation. A batch entry whose detected kind differs
/// from its declared kind aborts the whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "media_kind", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// Lifecycle state of a media item.
///
/// `pending → processing → {active, failed}`; failed and stale pending items
/// are re-offered by the stalled sweep until the attempt ceiling moves them to
/// `dead`. `deleted` is set by content management (out of scope here) and
/// makes the row eligible for the retention purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "media_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum MediaStatus {
    Pending,
    Processing,
    Active,
    Failed,
    Dead,
    Deleted,
}

/// One uploaded asset and its derived serving keys.
///
/// `source_key` points at the untransformed original in the private namespace
/// and is never null once the row exists. Derivative keys stay null until a
/// processing run completes; for video the thumbnail reuses the small slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct MediaItem {
    pub id: i64,
    pub owner_id: i64,
    pub album_id: Option<i64>,
    pub kind: MediaKind,
    pub status: MediaStatus,
    pub source_key: String,
    pub content_type: String,
    pub small_key: Option<String>,
    pub medium_key: Option<String>,
    pub large_key: Option<String>,
    pub playback_key: Option<String>,
    pub preview_key: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub download_count: i64,
    pub processing_attempts: i32,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaItem {
    /// All non-null derivative keys (public namespace).
    pub fn derivative_keys(&self) -> Vec<&str> {
        [
            self.small_key.as_deref(),
            self.medium_key.as_deref(),
            self.large_key.as_deref(),
            self.playback_key.as_deref(),
            self.preview_key.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// The invariant an active item must satisfy before it may be surfaced.
    pub fn has_complete_derivatives(&self) -> bool {
        match self.kind {
            MediaKind::Image => {
                self.small_key.is_some() && self.medium_key.is_some() && self.large_key.is_some()
            }
            MediaKind::Video => self.playback_key.is_some() && self.preview_key.is_some(),
        }
    }
}

/// Insert payload for a media row created inside the intake transaction.
#[derive(Debug, Clone)]
pub struct NewMediaItem {
    pub owner_id: i64,
    pub album_id: Option<i64>,
    pub kind: MediaKind,
    pub source_key: String,
    pub content_type: String,
    pub title: String,
    pub description: Option<String>,
}

/// Derivative key set produced by one processing run, keyed by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerivativeKeys {
    Image {
        small: String,
        medium: String,
        large: String,
    },
    Video {
        playback: String,
        preview: String,
        /// Extracted frame; stored in the small-image slot.
        thumbnail: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(kind: MediaKind) -> MediaItem {
        MediaItem {
            id: 1,
            owner_id: 1,
            album_id: None,
            kind,
            status: MediaStatus::Active,
            source_key: "1/abc.jpg".into(),
            content_type: "image/jpeg".into(),
            small_key: None,
            medium_key: None,
            large_key: None,
            playback_key: None,
            preview_key: None,
            title: "t".into(),
            description: None,
            download_count: 0,
            processing_attempts: 0,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn image_needs_all_three_sizes() {
        let mut m = item(MediaKind::Image);
        assert!(!m.has_complete_derivatives());
        m.small_key = Some("s".into());
        m.medium_key = Some("m".into());
        assert!(!m.has_complete_derivatives());
        m.large_key = Some("l".into());
        assert!(m.has_complete_derivatives());
    }

    #[test]
    fn video_needs_playback_and_preview() {
        let mut m = item(MediaKind::Video);
        m.small_key = Some("thumb".into());
        assert!(!m.has_complete_derivatives());
        m.playback_key = Some("p".into());
        m.preview_key = Some("c".into());
        assert!(m.has_complete_derivatives());
    }

    #[test]
    fn derivative_keys_skips_nulls() {
        let mut m = item(MediaKind::Video);
        m.small_key = Some("a".into());
        m.playback_key = Some("b".into());
        assert_eq!(m.derivative_keys(), vec!["a", "b"]);
    }
}
