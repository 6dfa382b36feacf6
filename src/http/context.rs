//! Application state shared by request handlers.

use axum::extract::FromRef;
use std::sync::Arc;

use crate::auth::{AccountService, PasswordHasher, RefreshTokenRotator, TokenIssuer};
use crate::config::Config;
use crate::oauth::{IdentityProvider, OAuthLinker};
use crate::storage::AuthStorage;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Verifies bearer tokens at the request boundary
    pub tokens: TokenIssuer,
    /// Local account operations
    pub account_service: Arc<AccountService>,
    /// External identity login
    pub oauth_linker: Arc<OAuthLinker>,
}

impl AppState {
    /// Wire the account services over `storage` using the settings in `config`.
    pub fn new(
        config: Config,
        storage: Arc<dyn AuthStorage>,
        provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        let tokens = TokenIssuer::new(config.tokens.clone());
        let rotator = Arc::new(
            RefreshTokenRotator::new(storage.clone(), tokens.clone())
                .with_revocation(config.enforce_refresh_revocation),
        );
        let account_service = Arc::new(
            AccountService::new(
                storage.clone(),
                PasswordHasher::new(config.hash_secret.clone()),
                rotator.clone(),
            )
            .with_password_reset(
                config.frontend_url.clone(),
                config.password_reset_expiration,
            ),
        );
        let oauth_linker = Arc::new(OAuthLinker::new(storage, provider, rotator));

        Self {
            config: Arc::new(config),
            tokens,
            account_service,
            oauth_linker,
        }
    }
}

impl FromRef<AppState> for TokenIssuer {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.tokens.clone()
    }
}

impl FromRef<AppState> for Arc<AccountService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.account_service.clone()
    }
}

impl FromRef<AppState> for Arc<OAuthLinker> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.oauth_linker.clone()
    }
}
