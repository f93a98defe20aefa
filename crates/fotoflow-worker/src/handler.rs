//! Media processing state machine.
//!
//! One invocation per event: download the original into an exclusive scratch
//! directory, generate derivatives, upload them under a fresh generation
//! prefix, persist keys + `active`. Any failure moves the item to `failed`
//! and preserves the original; the stalled sweep owns retries. The scratch
//! directory is removed on every exit path via `TempDir`.
//!
//! Events can be re-delivered concurrently; each run writes its own
//! generation, so the surviving DB update wins and no run corrupts another.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use fotoflow_core::models::{DerivativeKeys, MediaKind, ProcessingEvent};
use fotoflow_db::MediaRepository;
use fotoflow_processing::validator::extension_for;
use fotoflow_processing::{FfmpegService, ImageDeriver, BOUND_LARGE, BOUND_MEDIUM, BOUND_SMALL};
use fotoflow_storage::keys::{derivative_key, DerivativeVariant};
use fotoflow_storage::{Namespace, ObjectStorage};

use crate::queue::EventHandler;

pub struct MediaWorker {
    media_repo: MediaRepository,
    storage: Arc<dyn ObjectStorage>,
    ffmpeg: FfmpegService,
}

impl MediaWorker {
    pub fn new(
        media_repo: MediaRepository,
        storage: Arc<dyn ObjectStorage>,
        ffmpeg: FfmpegService,
    ) -> Self {
        Self {
            media_repo,
            storage,
            ffmpeg,
        }
    }

    async fn process(&self, event: &ProcessingEvent) -> Result<DerivativeKeys> {
        let scratch = tempfile::Builder::new()
            .prefix(&format!("fotoflow-{}-", event.media_id))
            .tempdir()
            .context("failed to create scratch directory")?;

        let input = scratch
            .path()
            .join(format!("source.{}", extension_for(&event.content_type)));

        let bytes = self
            .storage
            .download_to_path(Namespace::Originals, &event.source_key, &input)
            .await
            .with_context(|| format!("failed to download original {}", event.source_key))?;

        tracing::info!(
            media_id = event.media_id,
            source_key = %event.source_key,
            size_bytes = bytes,
            "Original downloaded to scratch"
        );

        let generation = Uuid::new_v4();
        match event.kind {
            MediaKind::Image => self.derive_image(event, &input, scratch.path(), generation).await,
            MediaKind::Video => self.derive_video(event, &input, scratch.path(), generation).await,
        }
        // `scratch` drops here and removes the directory on success and
        // failure alike.
    }

    /// Fan out the three serving sizes; each chain resizes and uploads
    /// independently, and the item activates only when all three land.
    async fn derive_image(
        &self,
        event: &ProcessingEvent,
        input: &Path,
        scratch: &Path,
        generation: Uuid,
    ) -> Result<DerivativeKeys> {
        let (small, medium, large) = tokio::try_join!(
            self.image_chain(event, input, scratch, generation, DerivativeVariant::Small, BOUND_SMALL),
            self.image_chain(event, input, scratch, generation, DerivativeVariant::Medium, BOUND_MEDIUM),
            self.image_chain(event, input, scratch, generation, DerivativeVariant::Large, BOUND_LARGE),
        )?;

        Ok(DerivativeKeys::Image {
            small,
            medium,
            large,
        })
    }

    async fn image_chain(
        &self,
        event: &ProcessingEvent,
        input: &Path,
        scratch: &Path,
        generation: Uuid,
        variant: DerivativeVariant,
        bound: u32,
    ) -> Result<String> {
        let output = scratch.join(variant.file_name());
        let (w, h) = ImageDeriver::resize_to_bound(input, &output, bound)
            .await
            .with_context(|| format!("resize to {bound} failed"))?;

        let key = derivative_key(event.media_id, generation, variant);
        self.storage
            .upload_file(Namespace::Assets, &key, &output, "image/jpeg")
            .await
            .with_context(|| format!("derivative upload failed for {key}"))?;

        tracing::debug!(
            media_id = event.media_id,
            key = %key,
            width = w,
            height = h,
            "Image derivative uploaded"
        );

        Ok(key)
    }

    /// The three video outputs share one decode, so generation is
    /// sequential; the uploads then go out concurrently.
    async fn derive_video(
        &self,
        event: &ProcessingEvent,
        input: &Path,
        scratch: &Path,
        generation: Uuid,
    ) -> Result<DerivativeKeys> {
        let playback_out = scratch.join("playback.mp4");
        self.ffmpeg
            .transcode_mp4(input, &playback_out)
            .await
            .context("playback transcode failed")?;

        let thumb_out = scratch.join("thumb.jpg");
        self.ffmpeg
            .extract_thumbnail(input, &thumb_out)
            .await
            .context("thumbnail extraction failed")?;

        let preview_out = scratch.join("preview.mp4");
        self.ffmpeg
            .cut_preview(input, &preview_out)
            .await
            .context("preview cut failed")?;

        let playback_key = derivative_key(event.media_id, generation, DerivativeVariant::Playback);
        let preview_key = derivative_key(event.media_id, generation, DerivativeVariant::Preview);
        let thumbnail_key = derivative_key(event.media_id, generation, DerivativeVariant::Small);

        tokio::try_join!(
            self.storage
                .upload_file(Namespace::Assets, &playback_key, &playback_out, "video/mp4"),
            self.storage
                .upload_file(Namespace::Assets, &preview_key, &preview_out, "video/mp4"),
            self.storage
                .upload_file(Namespace::Assets, &thumbnail_key, &thumb_out, "image/jpeg"),
        )
        .context("derivative upload failed")?;

        Ok(DerivativeKeys::Video {
            playback: playback_key,
            preview: preview_key,
            thumbnail: thumbnail_key,
        })
    }
}

#[async_trait]
impl EventHandler for MediaWorker {
    async fn handle(&self, event: ProcessingEvent) -> Result<()> {
        let item = self
            .media_repo
            .begin_attempt(event.media_id)
            .await
            .with_context(|| format!("failed to move media {} to processing", event.media_id))?;

        tracing::info!(
            media_id = event.media_id,
            attempt = item.processing_attempts,
            kind = ?event.kind,
            "Processing started"
        );

        match self.process(&event).await {
            Ok(keys) => {
                self.media_repo
                    .mark_active(event.media_id, &keys)
                    .await
                    .context("failed to persist derivative keys")?;
                tracing::info!(media_id = event.media_id, "Processing completed");
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    media_id = event.media_id,
                    error = %e,
                    "Processing failed; original preserved"
                );
                self.media_repo
                    .mark_failed(event.media_id)
                    .await
                    .context("failed to mark media as failed")?;
                Err(e)
            }
        }
    }
}
