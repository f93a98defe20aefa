//! Tag vocabulary repository.

use sqlx::{PgPool, Postgres, Transaction};

use fotoflow_core::models::Tag;
use fotoflow_core::AppError;

#[derive(Clone)]
pub struct TagRepository {
    pool: PgPool,
}

impl TagRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolve names against the existing vocabulary. Unknown names are
    /// silently dropped; intake never grows the vocabulary.
    pub async fn resolve_existing(&self, names: &[String]) -> Result<Vec<Tag>, AppError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let tags =
            sqlx::query_as::<Postgres, Tag>("SELECT * FROM tags WHERE name = ANY($1) ORDER BY id")
                .bind(names)
                .fetch_all(&self.pool)
                .await?;
        Ok(tags)
    }

    /// Link a media row to resolved tags inside the intake transaction.
    pub async fn attach_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        media_id: i64,
        tag_ids: &[i64],
    ) -> Result<(), AppError> {
        for tag_id in tag_ids {
            sqlx::query(
                "INSERT INTO media_tags (media_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(media_id)
            .bind(tag_id)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    /// Seed helper used by fixtures and admin tooling.
    pub async fn create(&self, name: &str) -> Result<Tag, AppError> {
        let tag = sqlx::query_as::<Postgres, Tag>(
            "INSERT INTO tags (name) VALUES ($1) \
             ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name \
             RETURNING *",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(tag)
    }
}
