//! PostgreSQL implementation for password reset token storage

use super::{column, from_db_id, query_error, to_db_id, write_error};
use crate::auth::types::PasswordResetToken;
use crate::storage::traits::{PasswordResetTokenStore, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;

/// PostgreSQL implementation of password reset token storage
pub struct PostgresPasswordResetTokenStore {
    pool: PgPool,
}

impl PostgresPasswordResetTokenStore {
    /// Create a new PostgreSQL password reset token store
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PasswordResetTokenStore for PostgresPasswordResetTokenStore {
    async fn create_password_reset_token(
        &self,
        user_id: u64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<PasswordResetToken> {
        let row = sqlx::query(
            r#"
            INSERT INTO password_reset_tokens (token, expires_at, is_used, user_id, created_at, updated_at)
            VALUES ($1, $2, FALSE, $3, $4, $4)
            RETURNING id, created_at
            "#,
        )
        .bind(token)
        .bind(expires_at)
        .bind(to_db_id(user_id)?)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(write_error)?;

        Ok(PasswordResetToken {
            id: from_db_id(column(&row, "id")?)?,
            token: token.to_string(),
            user_id,
            expires_at,
            used: false,
            created_at: column(&row, "created_at")?,
        })
    }

    async fn revoke_unused_password_reset_tokens(&self, user_id: u64) -> Result<usize> {
        let result = sqlx::query(
            r#"
            UPDATE password_reset_tokens SET is_used = TRUE, updated_at = $2
            WHERE user_id = $1 AND is_used = FALSE
            "#,
        )
        .bind(to_db_id(user_id)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected() as usize)
    }
}
