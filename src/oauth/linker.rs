//! Links external identities to local accounts and opens a session for them.

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE};
use rand::{RngCore, rngs::OsRng};

use crate::auth::claims::effective_claims;
use crate::auth::refresh::RefreshTokenRotator;
use crate::auth::types::{ExternalAuthResponse, NewUser, User};
use crate::errors::{AuthError, MissingEntity};
use crate::oauth::provider::{ExternalProfile, IdentityProvider};
use crate::storage::AuthStorage;

const STATE_BYTES: usize = 32;

pub struct OAuthLinker {
    storage: Arc<dyn AuthStorage>,
    provider: Arc<dyn IdentityProvider>,
    rotator: Arc<RefreshTokenRotator>,
}

impl OAuthLinker {
    pub fn new(
        storage: Arc<dyn AuthStorage>,
        provider: Arc<dyn IdentityProvider>,
        rotator: Arc<RefreshTokenRotator>,
    ) -> Self {
        Self {
            storage,
            provider,
            rotator,
        }
    }

    /// Provider authorization URL carrying `state`
    pub fn login_url(&self, state: &str) -> Result<String, AuthError> {
        self.provider.authorization_url(state)
    }

    /// Fresh CSRF state value for a login redirect
    pub fn new_state() -> Result<String, AuthError> {
        let mut bytes = [0u8; STATE_BYTES];
        OsRng.try_fill_bytes(&mut bytes).map_err(|err| {
            tracing::error!(error = ?err, "failed to generate oauth state");
            AuthError::Internal
        })?;
        Ok(URL_SAFE.encode(bytes))
    }

    /// Complete the authorization-code flow and open a remembered session.
    ///
    /// An existing account with the same email is linked to the external identity
    /// without further confirmation.
    pub async fn handle_callback(&self, code: &str) -> Result<ExternalAuthResponse, AuthError> {
        let external_token = self.provider.exchange_code(code).await?;
        let profile = self.provider.fetch_profile(&external_token).await?;
        if profile.id.is_empty() {
            tracing::error!("identity provider returned a profile without an id");
            return Err(AuthError::UpstreamFailure);
        }

        let existing = self
            .storage
            .find_user_by_external_id_or_email(&profile.id, &profile.email)
            .await?;

        let (user, is_new_user) = match existing {
            None => (self.create_linked_user(&profile).await?, true),
            Some(mut user) => {
                if !user.is_linked() {
                    self.backfill(&mut user, &profile).await;
                }
                (user, false)
            }
        };

        let claim_names = effective_claims(self.storage.as_ref(), &user).await?;
        let access_token = self.rotator.tokens().issue_access(&user, claim_names)?;
        let refresh_token = self.rotator.issue(user.id, true).await?;

        tracing::info!(user_id = user.id, is_new_user, provider = self.provider.name(), "external login");

        Ok(ExternalAuthResponse {
            access_token,
            refresh_token,
            is_new_user,
        })
    }

    async fn create_linked_user(&self, profile: &ExternalProfile) -> Result<User, AuthError> {
        let Some(default_role) = self.storage.get_default_role().await? else {
            tracing::error!("no default role configured");
            return Err(AuthError::NotFound(MissingEntity::DefaultRole));
        };

        let username = self.available_username(&profile.email).await?;

        let user = self
            .storage
            .create_user(NewUser {
                username,
                email: profile.email.clone(),
                password_hash: String::new(),
                role_id: default_role.id,
                external_provider: self.provider.name().to_string(),
                external_id: Some(profile.id.clone()),
                profile_image: Some(profile.picture.clone()).filter(|p| !p.is_empty()),
            })
            .await?;

        tracing::info!(user_id = user.id, username = %user.username, "created account from external identity");
        Ok(user)
    }

    /// Local part of `email`, suffixed with 1, 2, ... until no account uses it
    async fn available_username(&self, email: &str) -> Result<String, AuthError> {
        let base = email.split('@').next().unwrap_or_default();
        let mut candidate = base.to_string();
        let mut counter: u64 = 1;
        while self
            .storage
            .find_user_by_username(&candidate)
            .await?
            .is_some()
        {
            candidate = format!("{base}{counter}");
            counter += 1;
        }
        Ok(candidate)
    }

    /// Attach the external identity to an account found by email. `user` is only
    /// updated once the link is saved; a failed save does not fail the login.
    async fn backfill(&self, user: &mut User, profile: &ExternalProfile) {
        if !profile.verified_email {
            tracing::warn!(
                user_id = user.id,
                "linking external identity with an unverified email to an existing account"
            );
        }

        let mut linked = user.clone();
        linked.external_id = Some(profile.id.clone());
        linked.profile_image = Some(profile.picture.clone()).filter(|p| !p.is_empty());
        linked.external_provider = self.provider.name().to_string();

        match self.storage.update_user(&linked).await {
            Ok(()) => *user = linked,
            Err(err) => {
                tracing::error!(error = ?err, user_id = user.id, "failed to link external identity");
            }
        }
    }
}
