//! PostgreSQL implementation for user storage

use super::{column, from_db_id, non_empty, query_error, row_to_claim, to_db_id, write_error};
use crate::auth::types::{Claim, NewUser, User};
use crate::errors::StorageError;
use crate::storage::traits::{Result, UserStore};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgRow};

const USER_COLUMNS: &str = "id, username, email, password, role_id, google_id, provider, profile_image, created_at, updated_at";

/// PostgreSQL implementation of user storage
pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    /// Create a new PostgreSQL user store
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Convert PostgreSQL row to User without its claims
    fn row_to_user(row: &PgRow) -> Result<User> {
        Ok(User {
            id: from_db_id(column(row, "id")?)?,
            username: column(row, "username")?,
            email: column(row, "email")?,
            password_hash: column::<Option<String>>(row, "password")?.unwrap_or_default(),
            role_id: from_db_id(column(row, "role_id")?)?,
            claims: Vec::new(),
            external_provider: column::<Option<String>>(row, "provider")?.unwrap_or_default(),
            external_id: non_empty(column(row, "google_id")?),
            profile_image: non_empty(column(row, "profile_image")?),
            created_at: column(row, "created_at")?,
            updated_at: column(row, "updated_at")?,
        })
    }

    async fn user_claims(&self, user_id: u64) -> Result<Vec<Claim>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.name FROM claims c
            JOIN user_claims uc ON uc.claim_id = c.id
            WHERE uc.user_id = $1
            ORDER BY c.id
            "#,
        )
        .bind(to_db_id(user_id)?)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.iter().map(row_to_claim).collect()
    }

    async fn with_claims(&self, row: Option<PgRow>) -> Result<Option<User>> {
        let Some(row) = row else {
            return Ok(None);
        };
        let mut user = Self::row_to_user(&row)?;
        user.claims = self.user_claims(user.id).await?;
        Ok(Some(user))
    }

    async fn find_by_column(&self, name: &str, value: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE {} = $1 ORDER BY id LIMIT 1",
            USER_COLUMNS, name
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        self.with_claims(row).await
    }
}

#[async_trait]
impl UserStore for PostgresUserStore {
    async fn get_user(&self, id: u64) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(to_db_id(id)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        self.with_claims(row).await
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.find_by_column("username", username).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_by_column("email", email).await
    }

    async fn find_user_by_external_id_or_email(
        &self,
        external_id: &str,
        email: &str,
    ) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM users
            WHERE (google_id = $1 AND $1 <> '') OR email = $2
            ORDER BY CASE WHEN google_id = $1 THEN 0 ELSE 1 END, id
            LIMIT 1
            "#,
            USER_COLUMNS
        ))
        .bind(external_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        self.with_claims(row).await
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (
                username, email, password, role_id, google_id, provider, profile_image, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(to_db_id(user.role_id)?)
        .bind(non_empty(user.external_id))
        .bind(&user.external_provider)
        .bind(user.profile_image.unwrap_or_default())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(write_error)?;

        Self::row_to_user(&row)
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                username = $2, email = $3, password = $4, role_id = $5,
                google_id = $6, provider = $7, profile_image = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(to_db_id(user.id)?)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(to_db_id(user.role_id)?)
        .bind(non_empty(user.external_id.clone()))
        .bind(&user.external_provider)
        .bind(user.profile_image.clone().unwrap_or_default())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("user {}", user.id)));
        }
        Ok(())
    }

    async fn set_user_claims(&self, user_id: u64, claim_ids: &[u64]) -> Result<()> {
        let user_id = to_db_id(user_id)?;
        let claim_ids = claim_ids
            .iter()
            .map(|id| to_db_id(*id))
            .collect::<Result<Vec<i64>>>()?;

        let mut tx = self.pool.begin().await.map_err(query_error)?;

        sqlx::query("DELETE FROM user_claims WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(write_error)?;

        sqlx::query(
            r#"
            INSERT INTO user_claims (user_id, claim_id)
            SELECT $1, id FROM claims WHERE id = ANY($2)
            "#,
        )
        .bind(user_id)
        .bind(&claim_ids)
        .execute(&mut *tx)
        .await
        .map_err(write_error)?;

        tx.commit().await.map_err(query_error)?;
        Ok(())
    }
}
