//! Configuration module
//!
//! Every component takes an explicit immutable config struct at construction;
//! nothing reads the environment after startup. [`AppConfig::from_env`] is the
//! single place environment variables are resolved.

use std::env;
use std::time::Duration;

const DEFAULT_MAX_FILES_PER_BATCH: usize = 20;
const DEFAULT_IMAGE_MAX_BYTES: u64 = 25 * 1024 * 1024;
const DEFAULT_VIDEO_MAX_BYTES: u64 = 1024 * 1024 * 1024;
const DEFAULT_VIDEO_MAX_DURATION_SECS: f64 = 300.0;
const DEFAULT_PRESIGN_EXPIRY_SECS: u64 = 600;
const DEFAULT_MULTIPART_THRESHOLD_BYTES: u64 = 64 * 1024 * 1024;
const DEFAULT_MULTIPART_PART_BYTES: u64 = 16 * 1024 * 1024;

/// Upload validation and presigning policy for the intake service.
#[derive(Clone, Debug)]
pub struct UploadPolicy {
    pub max_files_per_batch: usize,
    pub image_max_bytes: u64,
    pub video_max_bytes: u64,
    /// Ceiling on probed video duration, in seconds.
    pub video_max_duration_secs: f64,
    pub image_allowed_extensions: Vec<String>,
    pub image_allowed_content_types: Vec<String>,
    pub video_allowed_extensions: Vec<String>,
    pub video_allowed_content_types: Vec<String>,
    /// Validity window for presigned PUT URLs.
    pub presign_expiry: Duration,
    /// Files at or above this size are routed through a multipart session.
    pub multipart_threshold_bytes: u64,
    pub multipart_part_bytes: u64,
    /// Base URL the multipart completion request is posted to; the media id
    /// is appended as a path segment.
    pub complete_url_base: String,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_files_per_batch: DEFAULT_MAX_FILES_PER_BATCH,
            image_max_bytes: DEFAULT_IMAGE_MAX_BYTES,
            video_max_bytes: DEFAULT_VIDEO_MAX_BYTES,
            video_max_duration_secs: DEFAULT_VIDEO_MAX_DURATION_SECS,
            image_allowed_extensions: vec_of(&["jpg", "jpeg", "png", "webp"]),
            image_allowed_content_types: vec_of(&["image/jpeg", "image/png", "image/webp"]),
            video_allowed_extensions: vec_of(&["mp4", "webm", "mov"]),
            video_allowed_content_types: vec_of(&["video/mp4", "video/webm", "video/quicktime"]),
            presign_expiry: Duration::from_secs(DEFAULT_PRESIGN_EXPIRY_SECS),
            multipart_threshold_bytes: DEFAULT_MULTIPART_THRESHOLD_BYTES,
            multipart_part_bytes: DEFAULT_MULTIPART_PART_BYTES,
            complete_url_base: "/uploads/complete".to_string(),
        }
    }
}

/// Reconciliation job policy: stalled-sweep selection and purge retention.
#[derive(Clone, Debug)]
pub struct SweepConfig {
    /// Age after which pending/failed items are re-offered.
    pub stalled_after: Duration,
    /// Lease on the processing state; items stuck in processing longer than
    /// this are treated as crashed-worker leftovers and re-offered.
    pub processing_lease: Duration,
    /// Requeue ceiling; items at or past it move to the terminal dead state.
    pub max_attempts: i32,
    /// Retention window for soft-deleted users and media.
    pub retention_days: i64,
    pub stalled_sweep_interval: Duration,
    pub purge_interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            stalled_after: Duration::from_secs(24 * 3600),
            processing_lease: Duration::from_secs(3600),
            max_attempts: 5,
            retention_days: 30,
            stalled_sweep_interval: Duration::from_secs(3600),
            purge_interval: Duration::from_secs(24 * 3600),
        }
    }
}

/// Application configuration resolved from the environment.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub upload: UploadPolicy,
    pub sweep: SweepConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let mut upload = UploadPolicy::default();
        if let Some(v) = env_parse::<usize>("FOTOFLOW_MAX_FILES_PER_BATCH")? {
            upload.max_files_per_batch = v;
        }
        if let Some(v) = env_parse::<u64>("FOTOFLOW_IMAGE_MAX_BYTES")? {
            upload.image_max_bytes = v;
        }
        if let Some(v) = env_parse::<u64>("FOTOFLOW_VIDEO_MAX_BYTES")? {
            upload.video_max_bytes = v;
        }
        if let Some(v) = env_parse::<f64>("FOTOFLOW_VIDEO_MAX_DURATION_SECS")? {
            upload.video_max_duration_secs = v;
        }
        if let Some(v) = env_parse::<u64>("FOTOFLOW_PRESIGN_EXPIRY_SECS")? {
            upload.presign_expiry = Duration::from_secs(v);
        }
        if let Ok(v) = env::var("FOTOFLOW_COMPLETE_URL_BASE") {
            upload.complete_url_base = v;
        }

        let mut sweep = SweepConfig::default();
        if let Some(v) = env_parse::<u64>("FOTOFLOW_STALLED_AFTER_SECS")? {
            sweep.stalled_after = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<u64>("FOTOFLOW_PROCESSING_LEASE_SECS")? {
            sweep.processing_lease = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<i32>("FOTOFLOW_MAX_ATTEMPTS")? {
            sweep.max_attempts = v;
        }
        if let Some(v) = env_parse::<i64>("FOTOFLOW_RETENTION_DAYS")? {
            sweep.retention_days = v;
        }

        Ok(Self {
            database_url,
            ffmpeg_path: env::var("FOTOFLOW_FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            ffprobe_path: env::var("FOTOFLOW_FFPROBE_PATH")
                .unwrap_or_else(|_| "ffprobe".to_string()),
            upload,
            sweep,
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>, anyhow::Error> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {:?}", name, raw)),
        Err(_) => Ok(None),
    }
}

fn vec_of(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_policy_defaults() {
        let policy = UploadPolicy::default();
        assert_eq!(policy.max_files_per_batch, 20);
        assert_eq!(policy.presign_expiry, Duration::from_secs(600));
        assert!(policy
            .image_allowed_content_types
            .contains(&"image/jpeg".to_string()));
        assert!(!policy
            .image_allowed_content_types
            .contains(&"image/gif".to_string()));
    }

    #[test]
    fn sweep_defaults_cover_a_day_and_a_month() {
        let sweep = SweepConfig::default();
        assert_eq!(sweep.stalled_after, Duration::from_secs(86_400));
        assert_eq!(sweep.retention_days, 30);
        assert_eq!(sweep.max_attempts, 5);
    }
}
