//! Media item repository.
//!
//! Status updates are single update-by-id statements; there are no
//! read-modify-write cycles, so concurrent re-delivery resolves to
//! last-writer-wins (the derivative generation prefix keeps each run's
//! outputs internally consistent).

use sqlx::{PgPool, Postgres, Transaction};

use fotoflow_core::models::{DerivativeKeys, MediaItem, MediaStatus, NewMediaItem};
use fotoflow_core::AppError;

#[derive(Clone)]
pub struct MediaRepository {
    pool: PgPool,
}

impl MediaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one media row inside the intake transaction. The row starts in
    /// `pending`; the source key must already be minted and unique.
    pub async fn create_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        new: &NewMediaItem,
    ) -> Result<MediaItem, AppError> {
        let item = sqlx::query_as::<Postgres, MediaItem>(
            "INSERT INTO media_items \
               (owner_id, album_id, kind, status, source_key, content_type, title, description) \
             VALUES ($1, $2, $3, 'pending', $4, $5, $6, $7) \
             RETURNING *",
        )
        .bind(new.owner_id)
        .bind(new.album_id)
        .bind(new.kind)
        .bind(&new.source_key)
        .bind(&new.content_type)
        .bind(&new.title)
        .bind(&new.description)
        .fetch_one(&mut **tx)
        .await?;

        Ok(item)
    }

    pub async fn get(&self, id: i64) -> Result<Option<MediaItem>, AppError> {
        let item = sqlx::query_as::<Postgres, MediaItem>(
            "SELECT * FROM media_items WHERE id = $1 AND status <> 'deleted'",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(item)
    }

    /// Lookup by ids that also returns soft-deleted rows, for purge and
    /// administrative bulk delete.
    pub async fn get_with_deleted(&self, ids: &[i64]) -> Result<Vec<MediaItem>, AppError> {
        let items = sqlx::query_as::<Postgres, MediaItem>(
            "SELECT * FROM media_items WHERE id = ANY($1) ORDER BY id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// All members of the given albums, including soft-deleted rows.
    pub async fn members_of_albums_with_deleted(
        &self,
        album_ids: &[i64],
    ) -> Result<Vec<MediaItem>, AppError> {
        let items = sqlx::query_as::<Postgres, MediaItem>(
            "SELECT * FROM media_items WHERE album_id = ANY($1) ORDER BY id",
        )
        .bind(album_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// Items owned by `owner_id` whose source key is in `keys` and that are
    /// still `pending`: the mark-ready re-validation set.
    pub async fn find_pending_by_source_keys(
        &self,
        owner_id: i64,
        keys: &[String],
    ) -> Result<Vec<MediaItem>, AppError> {
        let items = sqlx::query_as::<Postgres, MediaItem>(
            "SELECT * FROM media_items \
             WHERE owner_id = $1 AND source_key = ANY($2) AND status = 'pending' \
             ORDER BY id",
        )
        .bind(owner_id)
        .bind(keys)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// The album cover: the lowest-id active member. This computed value is
    /// the single source of truth; there is no stored representative flag.
    pub async fn album_cover(&self, album_id: i64) -> Result<Option<MediaItem>, AppError> {
        let item = sqlx::query_as::<Postgres, MediaItem>(
            "SELECT * FROM media_items \
             WHERE album_id = $1 AND status = 'active' \
             ORDER BY id ASC LIMIT 1",
        )
        .bind(album_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(item)
    }

    /// Worker entry point: move to `processing` and count the attempt.
    pub async fn begin_attempt(&self, id: i64) -> Result<MediaItem, AppError> {
        let item = sqlx::query_as::<Postgres, MediaItem>(
            "UPDATE media_items \
             SET status = 'processing', \
                 processing_attempts = processing_attempts + 1, \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING *",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(item)
    }

    /// Move to `processing` without counting an attempt (mark-ready flip;
    /// the worker's `begin_attempt` does the counting).
    pub async fn set_processing(&self, id: i64) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE media_items SET status = 'processing', updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist a run's derivative keys and activate the item in one update.
    pub async fn mark_active(&self, id: i64, keys: &DerivativeKeys) -> Result<(), AppError> {
        match keys {
            DerivativeKeys::Image {
                small,
                medium,
                large,
            } => {
                sqlx::query(
                    "UPDATE media_items \
                     SET status = 'active', small_key = $2, medium_key = $3, large_key = $4, \
                         updated_at = now() \
                     WHERE id = $1",
                )
                .bind(id)
                .bind(small)
                .bind(medium)
                .bind(large)
                .execute(&self.pool)
                .await?;
            }
            DerivativeKeys::Video {
                playback,
                preview,
                thumbnail,
            } => {
                sqlx::query(
                    "UPDATE media_items \
                     SET status = 'active', playback_key = $2, preview_key = $3, small_key = $4, \
                         updated_at = now() \
                     WHERE id = $1",
                )
                .bind(id)
                .bind(playback)
                .bind(preview)
                .bind(thumbnail)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    pub async fn mark_failed(&self, id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE media_items SET status = 'failed', updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Terminal state for items that exhausted their requeue budget.
    pub async fn mark_dead(&self, ids: &[i64]) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE media_items SET status = 'dead', updated_at = now() WHERE id = ANY($1)",
        )
        .bind(ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Work that should have progressed but did not: pending/failed rows past
    /// the stalled threshold (age since creation), plus processing rows whose
    /// lease expired (age since the last status write).
    pub async fn find_stalled(
        &self,
        stalled_after_secs: f64,
        processing_lease_secs: f64,
    ) -> Result<Vec<MediaItem>, AppError> {
        let items = sqlx::query_as::<Postgres, MediaItem>(
            "SELECT * FROM media_items \
             WHERE source_key IS NOT NULL \
               AND ((status IN ('pending', 'failed') \
                       AND created_at < now() - make_interval(secs => $1)) \
                 OR (status = 'processing' \
                       AND updated_at < now() - make_interval(secs => $2))) \
             ORDER BY id",
        )
        .bind(stalled_after_secs)
        .bind(processing_lease_secs)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// Soft-deleted rows past the retention window, eligible for hard purge.
    pub async fn find_soft_deleted_before(
        &self,
        retention_days: i64,
    ) -> Result<Vec<MediaItem>, AppError> {
        let items = sqlx::query_as::<Postgres, MediaItem>(
            "SELECT * FROM media_items \
             WHERE status = 'deleted' \
               AND deleted_at IS NOT NULL \
               AND deleted_at < now() - make_interval(days => $1) \
             ORDER BY id",
        )
        .bind(retention_days as i32)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// Hard-delete rows inside a caller-held transaction (purge, bulk delete).
    pub async fn delete_rows_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        ids: &[i64],
    ) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM media_items WHERE id = ANY($1)")
            .bind(ids)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }

    /// Soft delete: timestamp plus status flip. Driven by content management,
    /// not the pipeline; present so tests and purge fixtures share one path.
    pub async fn soft_delete(&self, id: i64) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE media_items \
             SET status = 'deleted', deleted_at = now(), updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Requeue eligibility given the attempt ceiling: past the ceiling the item
/// is dead, otherwise it gets another processing event.
pub fn is_requeue_eligible(item: &MediaItem, max_attempts: i32) -> bool {
    item.processing_attempts < max_attempts
        && matches!(
            item.status,
            MediaStatus::Pending | MediaStatus::Failed | MediaStatus::Processing
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fotoflow_core::models::MediaKind;

    fn item(status: MediaStatus, attempts: i32) -> MediaItem {
        MediaItem {
            id: 1,
            owner_id: 1,
            album_id: None,
            kind: MediaKind::Image,
            status,
            source_key: "1/a.jpg".into(),
            content_type: "image/jpeg".into(),
            small_key: None,
            medium_key: None,
            large_key: None,
            playback_key: None,
            preview_key: None,
            title: "t".into(),
            description: None,
            download_count: 0,
            processing_attempts: attempts,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn requeue_allows_under_ceiling() {
        assert!(is_requeue_eligible(&item(MediaStatus::Failed, 4), 5));
        assert!(is_requeue_eligible(&item(MediaStatus::Pending, 0), 5));
        assert!(is_requeue_eligible(&item(MediaStatus::Processing, 2), 5));
    }

    #[test]
    fn requeue_blocks_at_ceiling() {
        assert!(!is_requeue_eligible(&item(MediaStatus::Failed, 5), 5));
        assert!(!is_requeue_eligible(&item(MediaStatus::Failed, 9), 5));
    }

    #[test]
    fn requeue_never_touches_terminal_states() {
        assert!(!is_requeue_eligible(&item(MediaStatus::Active, 0), 5));
        assert!(!is_requeue_eligible(&item(MediaStatus::Dead, 0), 5));
        assert!(!is_requeue_eligible(&item(MediaStatus::Deleted, 0), 5));
    }
}
