//! Storage trait definitions for accounts, roles, claims and credential tokens.
//!
//! Defines async storage interfaces that can be implemented by various backend
//! providers. Uniqueness violations are reported as `StorageError::Conflict`
//! carrying the column name so callers can tell them apart from other failures.

use crate::auth::types::*;
use crate::errors::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub type Result<T> = std::result::Result<T, StorageError>;

/// Trait for storing and retrieving user accounts
#[async_trait]
pub trait UserStore {
    /// Retrieve a user, with its direct claims, by ID
    async fn get_user(&self, id: u64) -> Result<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Retrieve the user whose external ID or email matches
    async fn find_user_by_external_id_or_email(
        &self,
        external_id: &str,
        email: &str,
    ) -> Result<Option<User>>;

    /// Insert a new user and return it with its assigned ID
    async fn create_user(&self, user: NewUser) -> Result<User>;

    /// Persist the scalar fields of an existing user
    async fn update_user(&self, user: &User) -> Result<()>;

    /// Replace the direct claims of a user
    async fn set_user_claims(&self, user_id: u64, claim_ids: &[u64]) -> Result<()>;
}

/// Trait for retrieving roles
#[async_trait]
pub trait RoleStore {
    /// Retrieve the role assigned to new accounts
    async fn get_default_role(&self) -> Result<Option<Role>>;

    /// Retrieve a role, with its claims, by ID
    async fn get_role(&self, id: u64) -> Result<Option<Role>>;

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>>;
}

/// Trait for retrieving claims
#[async_trait]
pub trait ClaimStore {
    /// Retrieve the claims whose IDs are listed; unknown IDs are skipped
    async fn find_claims_by_ids(&self, ids: &[u64]) -> Result<Vec<Claim>>;
}

/// Trait for storing and retrieving refresh token records
#[async_trait]
pub trait RefreshTokenStore {
    /// Insert a record without a token string and return it with its assigned ID
    async fn create_refresh_token(&self, user_id: u64) -> Result<RefreshTokenRecord>;

    /// Persist the token string and revocation flag of an existing record
    async fn update_refresh_token(&self, record: &RefreshTokenRecord) -> Result<()>;

    async fn get_refresh_token(&self, id: u64) -> Result<Option<RefreshTokenRecord>>;

    async fn find_refresh_token_by_token(&self, token: &str)
    -> Result<Option<RefreshTokenRecord>>;
}

/// Trait for storing password reset tokens
#[async_trait]
pub trait PasswordResetTokenStore {
    /// Store a new password reset token
    async fn create_password_reset_token(
        &self,
        user_id: u64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<PasswordResetToken>;

    /// Mark every unused token of a user as used, returning how many changed
    async fn revoke_unused_password_reset_tokens(&self, user_id: u64) -> Result<usize>;
}

/// Combined trait for all account and credential storage
pub trait AuthStorage:
    UserStore + RoleStore + ClaimStore + RefreshTokenStore + PasswordResetTokenStore + Send + Sync
{
}
