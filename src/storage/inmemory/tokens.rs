//! In-memory refresh token and password reset token storage

use super::accounts::{MemoryAuthStorage, lock, next_id};
use crate::auth::types::*;
use crate::errors::StorageError;
use crate::storage::traits::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
impl RefreshTokenStore for MemoryAuthStorage {
    async fn create_refresh_token(&self, user_id: u64) -> Result<RefreshTokenRecord> {
        let record = RefreshTokenRecord {
            id: next_id(&self.refresh_token_ids),
            token: None,
            user_id,
            revoked: false,
            created_at: Utc::now(),
        };
        lock(&self.refresh_tokens)?.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_refresh_token(&self, record: &RefreshTokenRecord) -> Result<()> {
        let mut records = lock(&self.refresh_tokens)?;
        match records.get_mut(&record.id) {
            Some(stored) => {
                stored.token = record.token.clone();
                stored.revoked = record.revoked;
                Ok(())
            }
            None => Err(StorageError::NotFound(format!(
                "refresh token {}",
                record.id
            ))),
        }
    }

    async fn get_refresh_token(&self, id: u64) -> Result<Option<RefreshTokenRecord>> {
        Ok(lock(&self.refresh_tokens)?.get(&id).cloned())
    }

    async fn find_refresh_token_by_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshTokenRecord>> {
        Ok(lock(&self.refresh_tokens)?
            .values()
            .find(|record| record.token.as_deref() == Some(token))
            .cloned())
    }
}

#[async_trait]
impl PasswordResetTokenStore for MemoryAuthStorage {
    async fn create_password_reset_token(
        &self,
        user_id: u64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<PasswordResetToken> {
        let mut tokens = lock(&self.reset_tokens)?;
        if tokens.values().any(|existing| existing.token == token) {
            return Err(StorageError::Conflict("token".to_string()));
        }
        let reset = PasswordResetToken {
            id: next_id(&self.reset_token_ids),
            token: token.to_string(),
            user_id,
            expires_at,
            used: false,
            created_at: Utc::now(),
        };
        tokens.insert(reset.id, reset.clone());
        Ok(reset)
    }

    async fn revoke_unused_password_reset_tokens(&self, user_id: u64) -> Result<usize> {
        let mut tokens = lock(&self.reset_tokens)?;
        let mut revoked = 0;
        for token in tokens
            .values_mut()
            .filter(|token| token.user_id == user_id && !token.used)
        {
            token.used = true;
            revoked += 1;
        }
        Ok(revoked)
    }
}

impl MemoryAuthStorage {
    /// Password reset tokens issued to a user, oldest first
    pub fn password_reset_tokens_for(&self, user_id: u64) -> Result<Vec<PasswordResetToken>> {
        let mut tokens: Vec<PasswordResetToken> = lock(&self.reset_tokens)?
            .values()
            .filter(|token| token.user_id == user_id)
            .cloned()
            .collect();
        tokens.sort_by_key(|token| token.id);
        Ok(tokens)
    }
}
