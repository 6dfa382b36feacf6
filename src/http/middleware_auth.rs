//! Bearer token authentication.
//!
//! Verifies access tokens for protected endpoints and exposes their claims to
//! request handlers.

use axum::extract::{FromRef, FromRequestParts};
use http::header::AUTHORIZATION;
use http::request::Parts;

use crate::auth::{AccessTokenClaims, TokenIssuer, authorize, extract_bearer};
use crate::errors::AuthError;

/// Verified access token claims of the caller
///
/// # Example
///
/// ```ignore
/// use axum::{routing::get, Json, Router};
/// use knowstack::http::middleware_auth::ExtractedClaims;
///
/// async fn protected_handler(ExtractedClaims(claims): ExtractedClaims) -> Json<String> {
///     Json(claims.username)
/// }
///
/// let app = Router::new().route("/api/protected", get(protected_handler));
/// ```
///
/// Requests without an `Authorization: Bearer <token>` header, or with a token that
/// fails verification, are rejected with 401.
#[derive(Clone, Debug)]
pub struct ExtractedClaims(pub AccessTokenClaims);

impl ExtractedClaims {
    /// Reject the request with 403 unless every `required` claim was granted
    pub fn require(&self, required: &[&str]) -> Result<(), AuthError> {
        if authorize(&self.0.claim_ids, required) {
            Ok(())
        } else {
            tracing::info!(uid = %self.0.uid, ?required, "missing required claims");
            Err(AuthError::Forbidden)
        }
    }
}

impl<S> FromRequestParts<S> for ExtractedClaims
where
    TokenIssuer: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        let token = extract_bearer(header);
        if token.is_empty() {
            return Err(AuthError::TokenInvalid);
        }

        TokenIssuer::from_ref(state)
            .verify_access(token)
            .map(ExtractedClaims)
    }
}
