//! Local account operations: registration, login, session refresh and logout,
//! per-user claim assignment and password reset requests.

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use rand::{RngCore, rngs::OsRng};

use crate::auth::claims::effective_claims;
use crate::auth::password::PasswordHasher;
use crate::auth::refresh::RefreshTokenRotator;
use crate::auth::types::*;
use crate::config::PasswordResetHours;
use crate::errors::{AuthError, ExistingField, MissingEntity};
use crate::storage::AuthStorage;

const RESET_TOKEN_BYTES: usize = 32;

pub struct AccountService {
    storage: Arc<dyn AuthStorage>,
    hasher: PasswordHasher,
    rotator: Arc<RefreshTokenRotator>,
    frontend_url: String,
    password_reset_expiration: PasswordResetHours,
}

impl AccountService {
    pub fn new(
        storage: Arc<dyn AuthStorage>,
        hasher: PasswordHasher,
        rotator: Arc<RefreshTokenRotator>,
    ) -> Self {
        Self {
            storage,
            hasher,
            rotator,
            frontend_url: "http://localhost:3000".to_string(),
            password_reset_expiration: PasswordResetHours::from(1),
        }
    }

    /// Where reset links point and how long reset tokens stay valid.
    pub fn with_password_reset(
        mut self,
        frontend_url: impl Into<String>,
        expiration: PasswordResetHours,
    ) -> Self {
        self.frontend_url = frontend_url.into();
        self.password_reset_expiration = expiration;
        self
    }

    pub fn rotator(&self) -> &RefreshTokenRotator {
        &self.rotator
    }

    /// Register a local account with the default role.
    pub async fn create_user(
        &self,
        request: CreateUserRequest,
    ) -> Result<CreateUserResponse, AuthError> {
        validate_username(&request.username)?;
        validate_email(&request.email)?;
        validate_password(&request.password)?;

        tracing::info!(username = %request.username, email = %request.email, "creating user");

        if self
            .storage
            .find_user_by_username(&request.username)
            .await?
            .is_some()
        {
            tracing::info!(username = %request.username, "username already exists");
            return Err(AuthError::AlreadyExists(ExistingField::Username));
        }

        if self
            .storage
            .find_user_by_email(&request.email)
            .await?
            .is_some()
        {
            tracing::info!(email = %request.email, "email already exists");
            return Err(AuthError::AlreadyExists(ExistingField::Email));
        }

        let Some(default_role) = self.storage.get_default_role().await? else {
            tracing::error!("no default role configured");
            return Err(AuthError::NotFound(MissingEntity::DefaultRole));
        };

        let user = self
            .storage
            .create_user(NewUser {
                username: request.username,
                email: request.email,
                password_hash: self.hasher.hash(&request.password),
                role_id: default_role.id,
                external_provider: LOCAL_PROVIDER.to_string(),
                external_id: None,
                profile_image: None,
            })
            .await?;

        Ok(CreateUserResponse {
            id: user.id,
            username: user.username,
            email: user.email,
        })
    }

    /// Authenticate with email and password and open a session.
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse, AuthError> {
        validate_email(&request.email)?;
        validate_password(&request.password)?;

        tracing::info!(email = %request.email, remember = request.remember, "logging in user");

        let Some(user) = self.storage.find_user_by_email(&request.email).await? else {
            tracing::info!(email = %request.email, "login for unknown email");
            return Err(AuthError::NotFound(MissingEntity::User));
        };

        if !self.hasher.verify(&request.password, &user.password_hash) {
            tracing::info!(user_id = user.id, "invalid password");
            return Err(AuthError::InvalidCredential);
        }

        let claim_names = effective_claims(self.storage.as_ref(), &user).await?;
        let access_token = self.rotator.tokens().issue_access(&user, claim_names)?;
        let refresh_token = self.rotator.issue(user.id, request.remember).await?;

        Ok(LoginResponse {
            access_token,
            refresh_token,
        })
    }

    pub async fn refresh(&self, request: RefreshRequest) -> Result<RefreshResponse, AuthError> {
        require_refresh_token(&request.refresh_token)?;
        let access_token = self.rotator.refresh(&request.refresh_token).await?;
        Ok(RefreshResponse { access_token })
    }

    pub async fn logout(&self, request: LogoutRequest) -> Result<LogoutResponse, AuthError> {
        require_refresh_token(&request.refresh_token)?;
        self.rotator.logout(&request.refresh_token).await?;
        Ok(LogoutResponse { is_success: true })
    }

    /// Replace the direct claims of a user. Unknown claim IDs are skipped.
    pub async fn set_claims(&self, request: SetClaimsRequest) -> Result<(), AuthError> {
        tracing::info!(user_id = request.user_id, claim_ids = ?request.claim_ids, "setting claims");

        if self.storage.get_user(request.user_id).await?.is_none() {
            return Err(AuthError::NotFound(MissingEntity::User));
        }

        let claims = self
            .storage
            .find_claims_by_ids(&request.claim_ids)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, "failed to find claims");
                AuthError::NotFound(MissingEntity::Claims)
            })?;

        let claim_ids: Vec<u64> = claims.iter().map(|claim| claim.id).collect();
        self.storage
            .set_user_claims(request.user_id, &claim_ids)
            .await?;
        Ok(())
    }

    /// Issue a single-use password reset token.
    ///
    /// Unknown emails succeed without side effects so callers cannot probe for accounts.
    pub async fn request_password_reset(
        &self,
        request: RequestPasswordResetRequest,
    ) -> Result<RequestPasswordResetResponse, AuthError> {
        if request.email.trim().is_empty() {
            return Err(AuthError::InvalidRequest("email".to_string()));
        }

        let Some(user) = self.storage.find_user_by_email(&request.email).await? else {
            tracing::info!(email = %request.email, "password reset for unknown email");
            return Ok(RequestPasswordResetResponse { is_success: true });
        };

        let token = reset_token()?;
        let expires_at = Utc::now() + self.password_reset_expiration.as_duration();

        if let Err(err) = self
            .storage
            .revoke_unused_password_reset_tokens(user.id)
            .await
        {
            tracing::error!(error = ?err, user_id = user.id, "failed to revoke existing reset tokens");
        }

        self.storage
            .create_password_reset_token(user.id, &token, expires_at)
            .await?;

        let reset_url = format!("{}/reset-password?token={}", self.frontend_url, token);
        // Mail delivery is not wired up; the link is only logged.
        tracing::info!(user_id = user.id, %reset_url, "password reset requested");

        Ok(RequestPasswordResetResponse { is_success: true })
    }
}

fn reset_token() -> Result<String, AuthError> {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    OsRng.try_fill_bytes(&mut bytes).map_err(|err| {
        tracing::error!(error = ?err, "failed to generate password reset token");
        AuthError::Internal
    })?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

fn require_refresh_token(token: &str) -> Result<(), AuthError> {
    if token.is_empty() {
        return Err(AuthError::InvalidRequest("refreshToken".to_string()));
    }
    Ok(())
}

fn validate_username(username: &str) -> Result<(), AuthError> {
    let length = username.chars().count();
    if !(3..=30).contains(&length) || !username.chars().all(char::is_alphanumeric) {
        return Err(AuthError::InvalidRequest("username".to_string()));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), AuthError> {
    let invalid = || AuthError::InvalidRequest("email".to_string());
    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.contains('@')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || !domain.contains('.')
    {
        return Err(invalid());
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    let length = password.chars().count();
    if !(8..=72).contains(&length) {
        return Err(AuthError::InvalidRequest("password".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_rules() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("ali").is_ok());
        assert!(validate_username("çağrı42").is_ok());
        assert!(validate_username("al").is_err());
        assert!(validate_username("alice_smith").is_err());
        assert!(validate_username(&"a".repeat(31)).is_err());
    }

    #[test]
    fn test_email_rules() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("alice.smith+tag@mail.example.org").is_ok());
        for email in ["", "alice", "@example.com", "alice@", "alice@example", "a b@example.com", "a@b@c.com"] {
            assert_eq!(
                validate_email(email),
                Err(AuthError::InvalidRequest("email".to_string())),
                "{email:?}"
            );
        }
    }

    #[test]
    fn test_password_rules() {
        assert!(validate_password("password").is_ok());
        assert!(validate_password(&"p".repeat(72)).is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password(&"p".repeat(73)).is_err());
    }

    #[test]
    fn test_reset_tokens_are_unique() {
        let first = reset_token().unwrap();
        let second = reset_token().unwrap();
        assert_ne!(first, second);
        assert_eq!(URL_SAFE_NO_PAD.decode(&first).unwrap().len(), RESET_TOKEN_BYTES);
    }
}
