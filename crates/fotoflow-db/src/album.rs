//! Album repository.

use sqlx::{PgPool, Postgres, Transaction};

use fotoflow_core::models::Album;
use fotoflow_core::AppError;

#[derive(Clone)]
pub struct AlbumRepository {
    pool: PgPool,
}

impl AlbumRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert the album row inside the intake transaction, strictly before
    /// its members (they need the generated id).
    pub async fn create_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        owner_id: i64,
        title: &str,
        description: Option<&str>,
    ) -> Result<Album, AppError> {
        let album = sqlx::query_as::<Postgres, Album>(
            "INSERT INTO albums (owner_id, title, description) \
             VALUES ($1, $2, $3) \
             RETURNING *",
        )
        .bind(owner_id)
        .bind(title)
        .bind(description)
        .fetch_one(&mut **tx)
        .await?;
        Ok(album)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Album>, AppError> {
        let album = sqlx::query_as::<Postgres, Album>(
            "SELECT * FROM albums WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(album)
    }

    /// Lookup by ids including soft-deleted rows (purge, bulk delete).
    pub async fn get_with_deleted(&self, ids: &[i64]) -> Result<Vec<Album>, AppError> {
        let albums =
            sqlx::query_as::<Postgres, Album>("SELECT * FROM albums WHERE id = ANY($1) ORDER BY id")
                .bind(ids)
                .fetch_all(&self.pool)
                .await?;
        Ok(albums)
    }

    pub async fn delete_rows_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        ids: &[i64],
    ) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM albums WHERE id = ANY($1)")
            .bind(ids)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }
}
