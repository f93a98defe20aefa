//! User repository. The pipeline only needs ownership rows and the
//! soft-delete timestamp the retention purge keys off.

use sqlx::{PgPool, Postgres, Transaction};

use fotoflow_core::models::User;
use fotoflow_core::AppError;

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, username: &str) -> Result<User, AppError> {
        let user = sqlx::query_as::<Postgres, User>(
            "INSERT INTO users (username) VALUES ($1) RETURNING *",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn soft_delete(&self, id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET deleted_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Soft-deleted users past the retention window.
    pub async fn find_soft_deleted_before(
        &self,
        retention_days: i64,
    ) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<Postgres, User>(
            "SELECT * FROM users \
             WHERE deleted_at IS NOT NULL \
               AND deleted_at < now() - make_interval(days => $1) \
             ORDER BY id",
        )
        .bind(retention_days as i32)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    pub async fn purge_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        ids: &[i64],
    ) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ANY($1)")
            .bind(ids)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }
}
