//! Refresh token bookkeeping and the refresh/logout flows.
//!
//! A refresh token embeds the ID of its own record, so issuing one is two steps:
//! [`RefreshTokenRotator::reserve`] persists an empty record to obtain the ID and
//! [`RefreshTokenRotator::finalize`] stores the signed string on that record. A
//! crash between the steps leaves an unreferenced record behind, which is harmless.

use std::sync::Arc;

use crate::auth::claims::effective_claims;
use crate::auth::tokens::TokenIssuer;
use crate::auth::types::RefreshTokenRecord;
use crate::config::EnforceRefreshRevocation;
use crate::errors::{AuthError, MismatchKind, MissingEntity};
use crate::storage::AuthStorage;

pub struct RefreshTokenRotator {
    storage: Arc<dyn AuthStorage>,
    tokens: TokenIssuer,
    enforce_revocation: bool,
}

impl RefreshTokenRotator {
    pub fn new(storage: Arc<dyn AuthStorage>, tokens: TokenIssuer) -> Self {
        Self {
            storage,
            tokens,
            enforce_revocation: false,
        }
    }

    /// Reject refresh tokens whose record was revoked by a logout.
    pub fn with_revocation(mut self, enforce: EnforceRefreshRevocation) -> Self {
        self.enforce_revocation = *enforce.as_ref();
        self
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Persist a record without a token string and return it with its ID.
    pub async fn reserve(&self, user_id: u64) -> Result<RefreshTokenRecord, AuthError> {
        Ok(self.storage.create_refresh_token(user_id).await?)
    }

    /// Sign a refresh token for a reserved record and store it on the record.
    pub async fn finalize(
        &self,
        mut record: RefreshTokenRecord,
        remember: bool,
    ) -> Result<String, AuthError> {
        let signed = self
            .tokens
            .issue_refresh(record.user_id, record.id, remember)?;
        record.token = Some(signed.clone());
        self.storage.update_refresh_token(&record).await?;
        Ok(signed)
    }

    /// Reserve and finalize in one call.
    pub async fn issue(&self, user_id: u64, remember: bool) -> Result<String, AuthError> {
        let record = self.reserve(user_id).await?;
        self.finalize(record, remember).await
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// The refresh token itself is not rotated.
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, AuthError> {
        let claims = self.tokens.validate_refresh(refresh_token).map_err(|err| {
            tracing::info!(error = ?err, "refresh token rejected");
            err
        })?;
        let token_id = claims.token_id()?;
        let user_id = claims.user_id()?;

        let record = self
            .storage
            .get_refresh_token(token_id)
            .await?
            .ok_or(AuthError::NotFound(MissingEntity::TokenRecord))?;

        if record.user_id != user_id {
            tracing::warn!(
                token_id,
                user_id,
                record_user_id = record.user_id,
                "refresh token presented for another user's record"
            );
            return Err(AuthError::Mismatch(MismatchKind::TokenAndUser));
        }

        if self.enforce_revocation && record.revoked {
            tracing::info!(token_id, user_id, "revoked refresh token presented");
            return Err(AuthError::TokenInvalid);
        }

        let user = self
            .storage
            .get_user(record.user_id)
            .await?
            .ok_or(AuthError::NotFound(MissingEntity::User))?;

        let claim_names = effective_claims(self.storage.as_ref(), &user).await?;
        self.tokens.issue_access(&user, claim_names)
    }

    /// Mark the record holding `refresh_token` as revoked.
    ///
    /// Unknown tokens are accepted without effect.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let Some(mut record) = self
            .storage
            .find_refresh_token_by_token(refresh_token)
            .await?
        else {
            return Ok(());
        };

        record.revoked = true;
        self.storage.update_refresh_token(&record).await?;
        tracing::info!(token_id = record.id, user_id = record.user_id, "refresh token revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::types::{LOCAL_PROVIDER, NewUser};
    use crate::config::TokenConfig;
    use crate::storage::{MemoryAuthStorage, RefreshTokenStore, UserStore};

    async fn setup(enforce: bool) -> (Arc<MemoryAuthStorage>, RefreshTokenRotator, u64) {
        let storage = Arc::new(MemoryAuthStorage::seeded().unwrap());
        let user = storage
            .create_user(NewUser {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                password_hash: "v1:a:b".to_string(),
                role_id: 1,
                external_provider: LOCAL_PROVIDER.to_string(),
                external_id: None,
                profile_image: None,
            })
            .await
            .unwrap();
        let tokens = TokenIssuer::new(TokenConfig::new("a", "r", "knowstack", "knowstack"));
        let rotator = RefreshTokenRotator::new(storage.clone(), tokens)
            .with_revocation(EnforceRefreshRevocation::from(enforce));
        (storage, rotator, user.id)
    }

    #[tokio::test]
    async fn test_issue_stores_token_on_reserved_record() {
        let (storage, rotator, user_id) = setup(false).await;
        let token = rotator.issue(user_id, false).await.unwrap();

        let claims = rotator.tokens().validate_refresh(&token).unwrap();
        let record = storage
            .get_refresh_token(claims.token_id().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.token.as_deref(), Some(token.as_str()));
        assert_eq!(record.user_id, user_id);
    }

    #[tokio::test]
    async fn test_refresh_issues_access_token() {
        let (_storage, rotator, user_id) = setup(false).await;
        let token = rotator.issue(user_id, true).await.unwrap();

        let access = rotator.refresh(&token).await.unwrap();
        let claims = rotator.tokens().verify_access(&access).unwrap();
        assert_eq!(claims.user_id().unwrap(), user_id);
        assert_eq!(claims.username, "alice");
    }

    #[tokio::test]
    async fn test_refresh_with_unknown_record() {
        let (_storage, rotator, user_id) = setup(false).await;
        let token = rotator.tokens().issue_refresh(user_id, 999, false).unwrap();
        assert_eq!(
            rotator.refresh(&token).await,
            Err(AuthError::NotFound(MissingEntity::TokenRecord))
        );
    }

    #[tokio::test]
    async fn test_refresh_with_foreign_record() {
        let (_storage, rotator, user_id) = setup(false).await;
        let record = rotator.reserve(user_id).await.unwrap();
        let forged = rotator
            .tokens()
            .issue_refresh(user_id + 1, record.id, false)
            .unwrap();
        assert_eq!(
            rotator.refresh(&forged).await,
            Err(AuthError::Mismatch(MismatchKind::TokenAndUser))
        );
    }

    #[tokio::test]
    async fn test_revoked_tokens_still_refresh_unless_enforced() {
        let (_storage, rotator, user_id) = setup(false).await;
        let token = rotator.issue(user_id, false).await.unwrap();
        rotator.logout(&token).await.unwrap();
        assert!(rotator.refresh(&token).await.is_ok());

        let (_storage, rotator, user_id) = setup(true).await;
        let token = rotator.issue(user_id, false).await.unwrap();
        rotator.logout(&token).await.unwrap();
        assert_eq!(rotator.refresh(&token).await, Err(AuthError::TokenInvalid));
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let (storage, rotator, user_id) = setup(false).await;
        let token = rotator.issue(user_id, false).await.unwrap();

        rotator.logout(&token).await.unwrap();
        rotator.logout(&token).await.unwrap();
        rotator.logout("never-issued").await.unwrap();

        let record = storage
            .find_refresh_token_by_token(&token)
            .await
            .unwrap()
            .unwrap();
        assert!(record.revoked);
    }
}
