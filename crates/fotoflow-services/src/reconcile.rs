//! Reconciliation: the stalled sweep, the retention purge, and the
//! administrative bulk delete.
//!
//! The sweep re-offers work that should have progressed but did not; the
//! purge hard-deletes soft-deleted rows past the retention window, storage
//! objects first, rows second (one transaction per entity type); the bulk
//! delete bypasses the state machine and the retention window entirely.

use anyhow::{Context, Result};
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::Arc;

use fotoflow_core::models::{MediaItem, ProcessingEvent};
use fotoflow_core::{AppError, SweepConfig};
use fotoflow_db::media::is_requeue_eligible;
use fotoflow_db::{
    AlbumRepository, MediaRepository, QueueRepository, UserRepository, with_transaction,
};
use fotoflow_storage::{Namespace, ObjectStorage};

#[derive(Debug, Clone)]
pub struct DeleteTarget {
    pub id: i64,
    pub is_album: bool,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub requeued: usize,
    pub dead: usize,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub media_items: u64,
    pub users: u64,
    pub queue_rows: u64,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct BulkDeleteReport {
    pub albums: u64,
    pub media_items: u64,
}

pub struct ReconciliationService {
    pool: PgPool,
    media: MediaRepository,
    albums: AlbumRepository,
    users: UserRepository,
    queue: QueueRepository,
    storage: Arc<dyn ObjectStorage>,
    config: SweepConfig,
}

impl ReconciliationService {
    pub fn new(pool: PgPool, storage: Arc<dyn ObjectStorage>, config: SweepConfig) -> Self {
        Self {
            media: MediaRepository::new(pool.clone()),
            albums: AlbumRepository::new(pool.clone()),
            users: UserRepository::new(pool.clone()),
            queue: QueueRepository::new(pool.clone()),
            pool,
            storage,
            config,
        }
    }

    /// Re-offer stalled work: pending/failed rows past the age threshold and
    /// processing rows past the lease. Items at the attempt ceiling move to
    /// terminal `dead` instead of looping forever.
    pub async fn run_stalled_sweep(&self) -> Result<SweepReport> {
        let stalled = self
            .media
            .find_stalled(
                self.config.stalled_after.as_secs_f64(),
                self.config.processing_lease.as_secs_f64(),
            )
            .await
            .context("stalled query failed")?;

        let (eligible, exhausted): (Vec<_>, Vec<_>) = stalled
            .into_iter()
            .partition(|item| is_requeue_eligible(item, self.config.max_attempts));

        let dead_ids: Vec<i64> = exhausted.iter().map(|i| i.id).collect();
        if !dead_ids.is_empty() {
            self.media
                .mark_dead(&dead_ids)
                .await
                .context("failed to mark exhausted items dead")?;
            tracing::warn!(count = dead_ids.len(), ids = ?dead_ids, "Items exhausted their requeue budget");
        }

        for item in &eligible {
            self.queue
                .enqueue(&ProcessingEvent {
                    media_id: item.id,
                    source_key: item.source_key.clone(),
                    kind: item.kind,
                    content_type: item.content_type.clone(),
                })
                .await
                .with_context(|| format!("failed to requeue media {}", item.id))?;
        }

        let report = SweepReport {
            requeued: eligible.len(),
            dead: dead_ids.len(),
        };
        tracing::info!(
            requeued = report.requeued,
            dead = report.dead,
            "Stalled sweep completed"
        );
        Ok(report)
    }

    /// Hard-purge soft-deleted media and users past the retention window.
    /// Storage objects go first; a storage failure aborts before any row is
    /// touched (delete is idempotent, so a retry is harmless).
    pub async fn run_expiry_purge(&self) -> Result<PurgeReport> {
        let mut report = PurgeReport::default();

        let expired = self
            .media
            .find_soft_deleted_before(self.config.retention_days)
            .await
            .context("expired media query failed")?;

        if !expired.is_empty() {
            let (original_keys, asset_keys) = collect_storage_keys(&expired);
            self.storage
                .delete_keys(Namespace::Originals, &original_keys)
                .await
                .context("purge: originals delete failed")?;
            self.storage
                .delete_keys(Namespace::Assets, &asset_keys)
                .await
                .context("purge: assets delete failed")?;

            let ids: Vec<i64> = expired.iter().map(|i| i.id).collect();
            report.media_items = with_transaction(&self.pool, |tx| {
                let ids = ids.clone();
                Box::pin(async move { MediaRepository::delete_rows_in_tx(tx, &ids).await })
            })
            .await
            .context("purge: media row delete failed")?;
        }

        let expired_users = self
            .users
            .find_soft_deleted_before(self.config.retention_days)
            .await
            .context("expired users query failed")?;

        if !expired_users.is_empty() {
            let ids: Vec<i64> = expired_users.iter().map(|u| u.id).collect();
            report.users = with_transaction(&self.pool, |tx| {
                let ids = ids.clone();
                Box::pin(async move { UserRepository::purge_in_tx(tx, &ids).await })
            })
            .await
            .context("purge: user row delete failed")?;
        }

        report.queue_rows = self
            .queue
            .delete_finished_before(self.config.retention_days)
            .await
            .context("purge: finished queue rows delete failed")?;

        tracing::info!(
            media_items = report.media_items,
            users = report.users,
            queue_rows = report.queue_rows,
            "Expiry purge completed"
        );
        Ok(report)
    }

    /// Administrative bulk delete: resolves albums to all members (including
    /// already-soft-deleted rows), deletes the key union from storage with
    /// one delete call per namespace, then removes media and album rows.
    /// Irreversible; bypasses the soft-delete window.
    pub async fn bulk_delete(&self, targets: &[DeleteTarget]) -> Result<BulkDeleteReport> {
        let album_ids: Vec<i64> = targets.iter().filter(|t| t.is_album).map(|t| t.id).collect();
        let item_ids: Vec<i64> = targets.iter().filter(|t| !t.is_album).map(|t| t.id).collect();

        let albums = self
            .albums
            .get_with_deleted(&album_ids)
            .await
            .context("album lookup failed")?;

        let mut rows: BTreeMap<i64, MediaItem> = BTreeMap::new();
        if !album_ids.is_empty() {
            for item in self
                .media
                .members_of_albums_with_deleted(&album_ids)
                .await
                .context("album member lookup failed")?
            {
                rows.insert(item.id, item);
            }
        }
        if !item_ids.is_empty() {
            for item in self
                .media
                .get_with_deleted(&item_ids)
                .await
                .context("media lookup failed")?
            {
                rows.insert(item.id, item);
            }
        }

        let items: Vec<MediaItem> = rows.into_values().collect();
        let (original_keys, asset_keys) = collect_storage_keys(&items);

        self.storage
            .delete_keys(Namespace::Originals, &original_keys)
            .await
            .context("bulk delete: originals delete failed")?;
        self.storage
            .delete_keys(Namespace::Assets, &asset_keys)
            .await
            .context("bulk delete: assets delete failed")?;

        let media_ids: Vec<i64> = items.iter().map(|i| i.id).collect();
        let found_album_ids: Vec<i64> = albums.iter().map(|a| a.id).collect();

        let (media_items, deleted_albums) = with_transaction(&self.pool, |tx| {
            let media_ids = media_ids.clone();
            let found_album_ids = found_album_ids.clone();
            Box::pin(async move {
                let media_count = MediaRepository::delete_rows_in_tx(tx, &media_ids).await?;
                let album_count = AlbumRepository::delete_rows_in_tx(tx, &found_album_ids).await?;
                Ok::<_, AppError>((media_count, album_count))
            })
        })
        .await
        .context("bulk delete: row delete failed")?;

        let report = BulkDeleteReport {
            albums: deleted_albums,
            media_items,
        };
        tracing::info!(
            albums = report.albums,
            media_items = report.media_items,
            "Bulk delete completed"
        );
        Ok(report)
    }
}

/// Every storage key the given rows reference: the originals-namespace keys
/// and the assets-namespace derivative keys. Nulls excluded, duplicates
/// allowed; batch delete tolerates both.
pub fn collect_storage_keys(items: &[MediaItem]) -> (Vec<String>, Vec<String>) {
    let originals = items.iter().map(|i| i.source_key.clone()).collect();
    let assets = items
        .iter()
        .flat_map(|i| i.derivative_keys().into_iter().map(str::to_string))
        .collect();
    (originals, assets)
}
