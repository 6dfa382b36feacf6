//! External identity providers: authorization URL construction, code exchange and
//! profile retrieval.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::GoogleOAuthConfig;
use crate::errors::AuthError;

/// Profile document returned by the provider's userinfo endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalProfile {
    /// Provider-scoped stable account identifier
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub verified_email: bool,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
    #[serde(default)]
    pub picture: String,
    #[serde(default)]
    pub locale: String,
}

/// Authorization-code flow against an external identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Provider tag stored on linked accounts
    fn name(&self) -> &str;

    /// URL the browser is sent to, carrying the caller's opaque `state`
    fn authorization_url(&self, state: &str) -> Result<String, AuthError>;

    /// Exchange an authorization code for the provider's access token
    async fn exchange_code(&self, code: &str) -> Result<String, AuthError>;

    /// Fetch the profile of the access token's owner
    async fn fetch_profile(&self, access_token: &str) -> Result<ExternalProfile, AuthError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Google OAuth 2.0 provider
pub struct GoogleProvider {
    http_client: reqwest::Client,
    config: GoogleOAuthConfig,
}

impl GoogleProvider {
    pub fn new(http_client: reqwest::Client, config: GoogleOAuthConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn name(&self) -> &str {
        crate::auth::types::GOOGLE_PROVIDER
    }

    fn authorization_url(&self, state: &str) -> Result<String, AuthError> {
        let mut url = url::Url::parse(&self.config.auth_url).map_err(|e| {
            tracing::error!(error = ?e, auth_url = %self.config.auth_url, "invalid authorization endpoint");
            AuthError::Internal
        })?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_url)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", state);
        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> Result<String, AuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_url.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, "failed to exchange code");
                AuthError::UpstreamFailure
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, %body, "token endpoint rejected code exchange");
            return Err(AuthError::UpstreamFailure);
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            tracing::error!(error = ?e, "failed to parse token response");
            AuthError::UpstreamFailure
        })?;
        Ok(token.access_token)
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ExternalProfile, AuthError> {
        let response = self
            .http_client
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, "failed to get user info");
                AuthError::UpstreamFailure
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, %body, "userinfo endpoint returned an error");
            return Err(AuthError::UpstreamFailure);
        }

        let body = response.bytes().await.map_err(|e| {
            tracing::error!(error = ?e, "failed to read user info response");
            AuthError::UpstreamFailure
        })?;
        serde_json::from_slice(&body).map_err(|e| {
            tracing::error!(error = ?e, "failed to parse user info");
            AuthError::UpstreamFailure
        })
    }
}
