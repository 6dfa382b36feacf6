//! Account endpoints: registration, login, session refresh and logout, claim
//! assignment and password reset requests.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use http::StatusCode;

use crate::auth::{AccessTokenClaims, AccountService};
use crate::auth::types::*;
use crate::errors::AuthError;
use crate::http::middleware_auth::ExtractedClaims;

pub async fn handle_register(
    State(accounts): State<Arc<AccountService>>,
    Json(request): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let created = accounts.create_user(request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn handle_login(
    State(accounts): State<Arc<AccountService>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    accounts.login(request).await.map(Json)
}

pub async fn handle_refresh(
    State(accounts): State<Arc<AccountService>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, AuthError> {
    accounts.refresh(request).await.map(Json)
}

pub async fn handle_logout(
    State(accounts): State<Arc<AccountService>>,
    Json(request): Json<LogoutRequest>,
) -> Result<Json<LogoutResponse>, AuthError> {
    accounts.logout(request).await.map(Json)
}

pub async fn handle_set_claims(
    State(accounts): State<Arc<AccountService>>,
    caller: ExtractedClaims,
    Json(request): Json<SetClaimsRequest>,
) -> Result<StatusCode, AuthError> {
    caller.require(&[CLAIM_SET_USER_CLAIMS])?;
    accounts.set_claims(request).await?;
    Ok(StatusCode::OK)
}

pub async fn handle_request_password_reset(
    State(accounts): State<Arc<AccountService>>,
    Json(request): Json<RequestPasswordResetRequest>,
) -> Result<Json<RequestPasswordResetResponse>, AuthError> {
    accounts.request_password_reset(request).await.map(Json)
}

/// Claims of the verified access token
pub async fn handle_me(ExtractedClaims(claims): ExtractedClaims) -> Json<AccessTokenClaims> {
    Json(claims)
}
