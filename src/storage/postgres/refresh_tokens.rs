//! PostgreSQL implementation for refresh token storage

use super::{column, from_db_id, non_empty, query_error, to_db_id, write_error};
use crate::auth::types::RefreshTokenRecord;
use crate::errors::StorageError;
use crate::storage::traits::{RefreshTokenStore, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgRow};

/// PostgreSQL implementation of refresh token storage
pub struct PostgresRefreshTokenStore {
    pool: PgPool,
}

impl PostgresRefreshTokenStore {
    /// Create a new PostgreSQL refresh token store
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Convert PostgreSQL row to RefreshTokenRecord
    fn row_to_record(row: &PgRow) -> Result<RefreshTokenRecord> {
        Ok(RefreshTokenRecord {
            id: from_db_id(column(row, "id")?)?,
            token: non_empty(column(row, "token")?),
            user_id: from_db_id(column(row, "user_id")?)?,
            revoked: column::<Option<bool>>(row, "is_revoked")?.unwrap_or(false),
            created_at: column(row, "created_at")?,
        })
    }
}

#[async_trait]
impl RefreshTokenStore for PostgresRefreshTokenStore {
    async fn create_refresh_token(&self, user_id: u64) -> Result<RefreshTokenRecord> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token, is_revoked, user_id, created_at, updated_at)
            VALUES (NULL, FALSE, $1, $2, $2)
            RETURNING id, token, user_id, is_revoked, created_at
            "#,
        )
        .bind(to_db_id(user_id)?)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(write_error)?;

        Self::row_to_record(&row)
    }

    async fn update_refresh_token(&self, record: &RefreshTokenRecord) -> Result<()> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET token = $2, is_revoked = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(to_db_id(record.id)?)
        .bind(&record.token)
        .bind(record.revoked)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "refresh token {}",
                record.id
            )));
        }
        Ok(())
    }

    async fn get_refresh_token(&self, id: u64) -> Result<Option<RefreshTokenRecord>> {
        sqlx::query(
            "SELECT id, token, user_id, is_revoked, created_at FROM refresh_tokens WHERE id = $1",
        )
        .bind(to_db_id(id)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?
        .as_ref()
        .map(Self::row_to_record)
        .transpose()
    }

    async fn find_refresh_token_by_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshTokenRecord>> {
        sqlx::query(
            r#"
            SELECT id, token, user_id, is_revoked, created_at FROM refresh_tokens
            WHERE token = $1
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?
        .as_ref()
        .map(Self::row_to_record)
        .transpose()
    }
}
