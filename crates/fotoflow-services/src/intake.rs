//! Upload intake: validate, record intent transactionally, then move bytes.
//!
//! One transaction creates the (optional) album and all media rows in
//! `pending`; nothing partially persists. Byte movement happens after the
//! commit, outside any transaction: in server-received mode the service uploads
//! originals and enqueues events itself, in client-direct mode it mints
//! presigned transfer plans and defers emission to the `mark_ready`
//! callback. A `pending` row whose bytes never arrive is expected debris;
//! the stalled sweep re-offers it.

use std::path::PathBuf;
use std::sync::Arc;

use sqlx::PgPool;

use fotoflow_core::models::{
    MediaItem, MediaKind, NewMediaItem, PartUpload, ProcessingEvent, TransferMode, TransferPlan,
};
use fotoflow_core::{AppError, UploadPolicy};
use fotoflow_db::{AlbumRepository, MediaRepository, QueueRepository, TagRepository};
use fotoflow_processing::validator::extension_for;
use fotoflow_processing::{FfmpegService, UploadValidator};
use fotoflow_storage::{keys, Namespace, ObjectStorage};

/// One file in an ingest batch. `local_path` is set in server-received mode
/// (the bytes already landed on this host) and absent in client-direct mode.
#[derive(Debug, Clone)]
pub struct IngestEntry {
    pub file_name: String,
    pub content_type: String,
    pub declared_len: u64,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub local_path: Option<PathBuf>,
}

/// An ingest batch. Batches are homogeneous: every file's detected kind must
/// equal `kind` or the whole batch is rejected.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub kind: MediaKind,
    pub entries: Vec<IngestEntry>,
    pub as_album: bool,
    pub album_title: Option<String>,
}

#[derive(Debug)]
pub struct IngestedItem {
    pub media_id: i64,
    pub source_key: String,
    /// Present in client-direct mode only.
    pub plan: Option<TransferPlan>,
}

#[derive(Debug)]
pub struct IngestOutcome {
    pub album_id: Option<i64>,
    pub items: Vec<IngestedItem>,
}

pub struct IntakeService {
    pool: PgPool,
    media: MediaRepository,
    tags: TagRepository,
    queue: QueueRepository,
    storage: Arc<dyn ObjectStorage>,
    validator: UploadValidator,
    ffmpeg: FfmpegService,
}

impl IntakeService {
    pub fn new(
        pool: PgPool,
        storage: Arc<dyn ObjectStorage>,
        queue: QueueRepository,
        ffmpeg: FfmpegService,
        policy: UploadPolicy,
    ) -> Self {
        Self {
            media: MediaRepository::new(pool.clone()),
            tags: TagRepository::new(pool.clone()),
            pool,
            queue,
            storage,
            validator: UploadValidator::new(policy),
            ffmpeg,
        }
    }

    fn policy(&self) -> &UploadPolicy {
        self.validator.policy()
    }

    /// Ingest a batch for `owner_id`.
    ///
    /// Validation happens before any database write; the album and all media
    /// rows are created in one transaction; byte movement follows the commit.
    pub async fn ingest(
        &self,
        owner_id: i64,
        request: IngestRequest,
    ) -> Result<IngestOutcome, AppError> {
        self.validator
            .validate_batch_shape(request.entries.len())
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let server_received = request.entries.iter().filter(|e| e.local_path.is_some()).count();
        if server_received != 0 && server_received != request.entries.len() {
            return Err(AppError::Validation(
                "batch mixes server-received and client-direct entries".to_string(),
            ));
        }
        let server_mode = server_received == request.entries.len() && server_received > 0;

        // Validate every file before touching the database.
        for entry in &request.entries {
            let size = match &entry.local_path {
                Some(path) => tokio::fs::metadata(path)
                    .await
                    .map_err(|e| {
                        AppError::Validation(format!(
                            "unreadable upload {}: {e}",
                            entry.file_name
                        ))
                    })?
                    .len(),
                None => entry.declared_len,
            };

            let detected = self
                .validator
                .validate_file(&entry.file_name, &entry.content_type, size)
                .map_err(|e| AppError::Validation(e.to_string()))?;

            if detected != request.kind {
                return Err(AppError::Validation(format!(
                    "file {} is {:?} but the batch declares {:?}",
                    entry.file_name, detected, request.kind
                )));
            }

            // Video duration is probed from the actual bytes, which only
            // exist server-side in server-received mode; client-direct video
            // is probed at mark_ready.
            if detected == MediaKind::Video {
                if let Some(path) = &entry.local_path {
                    let duration = self.ffmpeg.probe_duration(path).await.map_err(|e| {
                        AppError::Validation(format!(
                            "unprobeable video {}: {e}",
                            entry.file_name
                        ))
                    })?;
                    self.validator
                        .validate_duration(duration)
                        .map_err(|e| AppError::Validation(e.to_string()))?;
                }
            }
        }

        // Unknown tag names are dropped, never created.
        let mut tag_names: Vec<String> = request
            .entries
            .iter()
            .flat_map(|e| e.tags.iter().cloned())
            .collect();
        tag_names.sort();
        tag_names.dedup();
        let vocabulary = self.tags.resolve_existing(&tag_names).await?;

        let wants_album = request.as_album || request.entries.len() > 1;

        // One transaction for the album and every member row; any failure
        // rolls the whole batch back.
        let mut tx = self.pool.begin().await?;
        let built = async {
            let album_id = if wants_album {
                let title = request
                    .album_title
                    .clone()
                    .unwrap_or_else(|| request.entries[0].title.clone());
                let album =
                    AlbumRepository::create_in_tx(&mut tx, owner_id, &title, None).await?;
                Some(album.id)
            } else {
                None
            };

            let mut items = Vec::with_capacity(request.entries.len());
            for entry in &request.entries {
                let source_key =
                    keys::source_key(owner_id, extension_for(&entry.content_type));
                let item = MediaRepository::create_in_tx(
                    &mut tx,
                    &NewMediaItem {
                        owner_id,
                        album_id,
                        kind: request.kind,
                        source_key,
                        content_type: entry.content_type.clone(),
                        title: entry.title.clone(),
                        description: entry.description.clone(),
                    },
                )
                .await?;

                let tag_ids: Vec<i64> = vocabulary
                    .iter()
                    .filter(|t| entry.tags.contains(&t.name))
                    .map(|t| t.id)
                    .collect();
                TagRepository::attach_in_tx(&mut tx, item.id, &tag_ids).await?;

                items.push(item);
            }
            Ok::<_, AppError>((album_id, items))
        }
        .await;

        let (album_id, items) = match built {
            Ok(v) => {
                tx.commit().await?;
                v
            }
            Err(e) => {
                tx.rollback().await.ok();
                return Err(e);
            }
        };

        tracing::info!(
            owner_id,
            album_id = ?album_id,
            item_count = items.len(),
            server_mode,
            "Intake batch committed"
        );

        let mut out = Vec::with_capacity(items.len());
        if server_mode {
            for (item, entry) in items.iter().zip(&request.entries) {
                let Some(path) = entry.local_path.as_ref() else {
                    continue;
                };
                match self
                    .storage
                    .upload_file(Namespace::Originals, &item.source_key, path, &entry.content_type)
                    .await
                {
                    Ok(()) => {
                        self.queue.enqueue(&event_for(item)).await?;
                    }
                    Err(e) => {
                        // The row stays pending; the stalled sweep re-offers it.
                        tracing::error!(
                            media_id = item.id,
                            source_key = %item.source_key,
                            error = %e,
                            "Original upload failed after commit; item left pending"
                        );
                    }
                }
                out.push(IngestedItem {
                    media_id: item.id,
                    source_key: item.source_key.clone(),
                    plan: None,
                });
            }
        } else {
            for (item, entry) in items.iter().zip(&request.entries) {
                let plan = self.mint_plan(item, entry).await?;
                out.push(IngestedItem {
                    media_id: item.id,
                    source_key: item.source_key.clone(),
                    plan: Some(plan),
                });
            }
        }

        Ok(IngestOutcome {
            album_id,
            items: out,
        })
    }

    /// Build the client-direct transfer plan: single PUT below the multipart
    /// threshold, a chunked session above it.
    async fn mint_plan(
        &self,
        item: &MediaItem,
        entry: &IngestEntry,
    ) -> Result<TransferPlan, AppError> {
        let policy = self.policy();
        let mode = if entry.declared_len < policy.multipart_threshold_bytes {
            let url = self
                .storage
                .presigned_put(
                    Namespace::Originals,
                    &item.source_key,
                    &entry.content_type,
                    entry.declared_len,
                    policy.presign_expiry,
                )
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
            TransferMode::SinglePut { url }
        } else {
            let upload_id = self
                .storage
                .create_multipart(Namespace::Originals, &item.source_key, &entry.content_type)
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;

            let part_size = policy.multipart_part_bytes;
            let part_count = entry.declared_len.div_ceil(part_size).max(1);
            let mut parts = Vec::with_capacity(part_count as usize);
            for part_number in 1..=part_count as i32 {
                let url = self
                    .storage
                    .presigned_part_put(
                        Namespace::Originals,
                        &item.source_key,
                        &upload_id,
                        part_number,
                        policy.presign_expiry,
                    )
                    .await
                    .map_err(|e| AppError::Storage(e.to_string()))?;
                parts.push(PartUpload { part_number, url });
            }

            TransferMode::Multipart {
                upload_id,
                part_size,
                parts,
                complete_url: format!("{}/{}", policy.complete_url_base, item.id),
            }
        };

        Ok(TransferPlan {
            source_key: item.source_key.clone(),
            content_type: entry.content_type.clone(),
            mode,
        })
    }

    /// Finish a client-direct multipart session. The serving layer posts the
    /// executor's sorted part list here; the storage contract rejects
    /// out-of-order lists.
    pub async fn complete_upload(
        &self,
        owner_id: i64,
        media_id: i64,
        upload_id: &str,
        parts: &[fotoflow_core::models::CompletedPart],
    ) -> Result<(), AppError> {
        let item = self
            .media
            .get(media_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("media {media_id}")))?;
        if item.owner_id != owner_id {
            return Err(AppError::Forbidden(format!("media {media_id}")));
        }

        self.storage
            .complete_multipart(Namespace::Originals, &item.source_key, upload_id, parts)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))
    }

    /// Client-direct "bytes have landed" callback.
    ///
    /// Re-validates that every key references a `pending` item owned by the
    /// caller and that the object actually exists; probes video durations
    /// against the uploaded bytes. Violations abort the call before anything
    /// flips, and duration violations additionally mark the offending items
    /// `failed`. Survivor batches flip to `processing` and get their events
    /// enqueued.
    pub async fn mark_ready(
        &self,
        owner_id: i64,
        source_keys: &[String],
    ) -> Result<Vec<i64>, AppError> {
        if source_keys.is_empty() {
            return Err(AppError::Validation("no keys to mark ready".to_string()));
        }

        let items = self
            .media
            .find_pending_by_source_keys(owner_id, source_keys)
            .await?;

        if items.len() != source_keys.len() {
            let known: Vec<&str> = items.iter().map(|i| i.source_key.as_str()).collect();
            let unknown: Vec<&String> = source_keys
                .iter()
                .filter(|k| !known.contains(&k.as_str()))
                .collect();
            return Err(AppError::Validation(format!(
                "keys not pending for this owner: {unknown:?}"
            )));
        }

        for item in &items {
            let exists = self
                .storage
                .exists(Namespace::Originals, &item.source_key)
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
            if !exists {
                return Err(AppError::Validation(format!(
                    "no uploaded object for key {}",
                    item.source_key
                )));
            }
        }

        let mut over_limit = Vec::new();
        for item in &items {
            if item.kind == MediaKind::Video {
                let duration = self.probe_uploaded(item).await?;
                if self.validator.validate_duration(duration).is_err() {
                    over_limit.push((item.id, duration));
                }
            }
        }
        if !over_limit.is_empty() {
            for (id, _) in &over_limit {
                self.media.mark_failed(*id).await?;
            }
            return Err(AppError::Validation(format!(
                "videos exceed the duration ceiling: {over_limit:?}"
            )));
        }

        let mut ready = Vec::with_capacity(items.len());
        for item in &items {
            self.media.set_processing(item.id).await?;
            self.queue.enqueue(&event_for(item)).await?;
            ready.push(item.id);
        }

        tracing::info!(owner_id, count = ready.len(), "Marked uploads ready");
        Ok(ready)
    }

    /// Duration of an already-uploaded video, probed from a scratch copy.
    async fn probe_uploaded(&self, item: &MediaItem) -> Result<f64, AppError> {
        let scratch = tempfile::tempdir()
            .map_err(|e| AppError::Internal(format!("scratch dir failed: {e}")))?;
        let local = scratch
            .path()
            .join(format!("probe.{}", extension_for(&item.content_type)));
        self.storage
            .download_to_path(Namespace::Originals, &item.source_key, &local)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        self.ffmpeg
            .probe_duration(&local)
            .await
            .map_err(|e| AppError::Validation(format!("unprobeable video: {e}")))
    }
}

fn event_for(item: &MediaItem) -> ProcessingEvent {
    ProcessingEvent {
        media_id: item.id,
        source_key: item.source_key.clone(),
        kind: item.kind,
        content_type: item.content_type.clone(),
    }
}
