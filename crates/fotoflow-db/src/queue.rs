//! Durable processing queue.
//!
//! Events are rows: enqueue inserts and fires `pg_notify`; workers claim with
//! `FOR UPDATE SKIP LOCKED` so concurrent instances never double-claim; a
//! lease reaper returns `running` rows whose claim is older than the lease to
//! `pending`, which makes a crashed worker's event redeliverable without any
//! bespoke coordination. Delivery is therefore at-least-once, never
//! exactly-once; consumers must tolerate re-delivery.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Postgres};

use fotoflow_core::models::ProcessingEvent;
use fotoflow_core::AppError;

/// Channel name for PostgreSQL LISTEN/NOTIFY when a new event is enqueued.
pub const EVENT_NOTIFY_CHANNEL: &str = "fotoflow_new_event";

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "queue_status", rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Running,
    Done,
    Failed,
}

/// One queued event row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QueueRow {
    pub id: i64,
    pub media_id: i64,
    pub payload: JsonValue,
    pub status: QueueStatus,
    pub attempts: i32,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl QueueRow {
    /// Deserialize the event payload. A malformed payload is a permanent
    /// failure for this row, not a reason to crash the worker.
    pub fn event(&self) -> Result<ProcessingEvent, AppError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| AppError::Internal(format!("malformed event payload: {e}")))
    }
}

#[derive(Clone)]
pub struct QueueRepository {
    pool: PgPool,
}

impl QueueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueue an event and wake listeners. Fire-and-forget from the
    /// producer's perspective; the row is the durability.
    pub async fn enqueue(&self, event: &ProcessingEvent) -> Result<i64, AppError> {
        let payload = serde_json::to_value(event)
            .map_err(|e| AppError::Internal(format!("event serialization failed: {e}")))?;

        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO processing_queue (media_id, payload) VALUES ($1, $2) RETURNING id",
        )
        .bind(event.media_id)
        .bind(&payload)
        .fetch_one(&self.pool)
        .await?;

        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(EVENT_NOTIFY_CHANNEL)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        tracing::info!(queue_id = id, media_id = event.media_id, "Processing event enqueued");

        Ok(id)
    }

    /// Claim the oldest pending row, if any. `SKIP LOCKED` keeps concurrent
    /// claimers from blocking on or double-claiming the same row.
    pub async fn claim_next(&self) -> Result<Option<QueueRow>, AppError> {
        let row = sqlx::query_as::<Postgres, QueueRow>(
            "UPDATE processing_queue \
             SET status = 'running', claimed_at = now(), attempts = attempts + 1 \
             WHERE id = (SELECT id FROM processing_queue \
                         WHERE status = 'pending' \
                         ORDER BY id \
                         LIMIT 1 \
                         FOR UPDATE SKIP LOCKED) \
             RETURNING *",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn mark_done(&self, id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE processing_queue SET status = 'done' WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE processing_queue SET status = 'failed' WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Visibility timeout: running rows claimed longer ago than the lease go
    /// back to pending for redelivery.
    pub async fn reap_stale(&self, lease_secs: f64) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE processing_queue \
             SET status = 'pending', claimed_at = NULL \
             WHERE status = 'running' \
               AND claimed_at < now() - make_interval(secs => $1)",
        )
        .bind(lease_secs)
        .execute(&self.pool)
        .await?;

        let reaped = result.rows_affected();
        if reaped > 0 {
            tracing::warn!(reaped, "Returned stale running events to pending");
        }
        Ok(reaped)
    }

    /// Drop finished rows older than the retention window.
    pub async fn delete_finished_before(&self, retention_days: i64) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM processing_queue \
             WHERE status IN ('done', 'failed') \
               AND created_at < now() - make_interval(days => $1)",
        )
        .bind(retention_days as i32)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
