//! PostgreSQL storage implementations
//!
//! This module provides PostgreSQL-based implementations of all storage traits over
//! the relational layout shared with the account database (`users`, `roles`,
//! `claims`, `role_claims`, `user_claims`, `refresh_tokens`,
//! `password_reset_tokens`). The schema is created and migrated externally.

mod password_reset_tokens;
mod refresh_tokens;
mod roles;
mod users;

use crate::auth::types::*;
use crate::errors::StorageError;
use crate::storage::traits::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row};
use std::sync::Arc;

pub use password_reset_tokens::PostgresPasswordResetTokenStore;
pub use refresh_tokens::PostgresRefreshTokenStore;
pub use roles::PostgresRoleStore;
pub use users::PostgresUserStore;

/// SQLSTATE reported for unique constraint violations
const UNIQUE_VIOLATION: &str = "23505";

/// Comprehensive PostgreSQL account storage implementation
pub struct PostgresAuthStorage {
    user_store: Arc<PostgresUserStore>,
    role_store: Arc<PostgresRoleStore>,
    refresh_token_store: Arc<PostgresRefreshTokenStore>,
    password_reset_token_store: Arc<PostgresPasswordResetTokenStore>,
}

impl PostgresAuthStorage {
    /// Create a new PostgreSQL storage instance
    pub fn new(pool: PgPool) -> Self {
        Self {
            user_store: Arc::new(PostgresUserStore::new(pool.clone())),
            role_store: Arc::new(PostgresRoleStore::new(pool.clone())),
            refresh_token_store: Arc::new(PostgresRefreshTokenStore::new(pool.clone())),
            password_reset_token_store: Arc::new(PostgresPasswordResetTokenStore::new(pool)),
        }
    }
}

/// Read a column, reporting the column name on failure
pub(crate) fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StorageError::DatabaseError(format!("Failed to get {}: {}", name, e)))
}

pub(crate) fn to_db_id(id: u64) -> Result<i64> {
    i64::try_from(id).map_err(|_| StorageError::InvalidData(format!("ID out of range: {}", id)))
}

pub(crate) fn from_db_id(id: i64) -> Result<u64> {
    u64::try_from(id).map_err(|_| StorageError::InvalidData(format!("Negative ID: {}", id)))
}

/// Empty strings and NULL are both stored for "no value"
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

pub(crate) fn query_error(e: sqlx::Error) -> StorageError {
    StorageError::QueryFailed(e.to_string())
}

/// Map a write failure, turning unique violations into `Conflict` with the column name
pub(crate) fn write_error(e: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            let constraint = db_err.constraint().unwrap_or_default();
            let column = [
                ("username", "username"),
                ("email", "email"),
                ("google_id", "external_id"),
                ("token", "token"),
            ]
            .iter()
            .find(|(needle, _)| constraint.contains(needle))
            .map(|(_, column)| *column)
            .unwrap_or("unknown");
            return StorageError::Conflict(column.to_string());
        }
    }
    StorageError::QueryFailed(e.to_string())
}

pub(crate) fn row_to_claim(row: &PgRow) -> Result<Claim> {
    Ok(Claim {
        id: from_db_id(column(row, "id")?)?,
        name: column(row, "name")?,
    })
}

#[async_trait]
impl UserStore for PostgresAuthStorage {
    async fn get_user(&self, id: u64) -> Result<Option<User>> {
        self.user_store.get_user(id).await
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.user_store.find_user_by_username(username).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.user_store.find_user_by_email(email).await
    }

    async fn find_user_by_external_id_or_email(
        &self,
        external_id: &str,
        email: &str,
    ) -> Result<Option<User>> {
        self.user_store
            .find_user_by_external_id_or_email(external_id, email)
            .await
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        self.user_store.create_user(user).await
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        self.user_store.update_user(user).await
    }

    async fn set_user_claims(&self, user_id: u64, claim_ids: &[u64]) -> Result<()> {
        self.user_store.set_user_claims(user_id, claim_ids).await
    }
}

#[async_trait]
impl RoleStore for PostgresAuthStorage {
    async fn get_default_role(&self) -> Result<Option<Role>> {
        self.role_store.get_default_role().await
    }

    async fn get_role(&self, id: u64) -> Result<Option<Role>> {
        self.role_store.get_role(id).await
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        self.role_store.find_role_by_name(name).await
    }
}

#[async_trait]
impl ClaimStore for PostgresAuthStorage {
    async fn find_claims_by_ids(&self, ids: &[u64]) -> Result<Vec<Claim>> {
        self.role_store.find_claims_by_ids(ids).await
    }
}

#[async_trait]
impl RefreshTokenStore for PostgresAuthStorage {
    async fn create_refresh_token(&self, user_id: u64) -> Result<RefreshTokenRecord> {
        self.refresh_token_store.create_refresh_token(user_id).await
    }

    async fn update_refresh_token(&self, record: &RefreshTokenRecord) -> Result<()> {
        self.refresh_token_store.update_refresh_token(record).await
    }

    async fn get_refresh_token(&self, id: u64) -> Result<Option<RefreshTokenRecord>> {
        self.refresh_token_store.get_refresh_token(id).await
    }

    async fn find_refresh_token_by_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshTokenRecord>> {
        self.refresh_token_store
            .find_refresh_token_by_token(token)
            .await
    }
}

#[async_trait]
impl PasswordResetTokenStore for PostgresAuthStorage {
    async fn create_password_reset_token(
        &self,
        user_id: u64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<PasswordResetToken> {
        self.password_reset_token_store
            .create_password_reset_token(user_id, token, expires_at)
            .await
    }

    async fn revoke_unused_password_reset_tokens(&self, user_id: u64) -> Result<usize> {
        self.password_reset_token_store
            .revoke_unused_password_reset_tokens(user_id)
            .await
    }
}

impl AuthStorage for PostgresAuthStorage {}
