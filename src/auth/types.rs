//! Account, role, claim and token record types plus the request/response bodies of
//! the account operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provider tag of accounts that authenticate with a local password
pub const LOCAL_PROVIDER: &str = "local";

/// Provider tag of accounts linked to a Google identity
pub const GOOGLE_PROVIDER: &str = "google";

/// Claim that allows assigning claims to accounts
pub const CLAIM_SET_USER_CLAIMS: &str = "user:claims:set";

/// Named permission atom
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Claim {
    pub id: u64,
    pub name: String,
}

/// Role with its granted claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: u64,
    pub name: String,
    /// Assignment target for newly created accounts
    pub is_default: bool,
    pub claims: Vec<Claim>,
}

/// Stored account
#[derive(Clone, Serialize, Deserialize)]
#[cfg_attr(any(debug_assertions, test), derive(Debug))]
pub struct User {
    pub id: u64,
    pub username: String,
    pub email: String,
    /// Stored credential string; empty for accounts created through an external provider
    pub password_hash: String,
    pub role_id: u64,
    /// Claims granted directly to the account, on top of its role's claims
    pub claims: Vec<Claim>,
    pub external_provider: String,
    pub external_id: Option<String>,
    pub profile_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether the account authenticates with a local password
    pub fn is_local(&self) -> bool {
        self.external_provider == LOCAL_PROVIDER
    }

    /// Whether the account is already linked to an external identity
    pub fn is_linked(&self) -> bool {
        self.external_id.as_deref().is_some_and(|id| !id.is_empty())
    }
}

/// Account to be inserted; the store assigns the identifier and timestamps
#[derive(Clone)]
#[cfg_attr(any(debug_assertions, test), derive(Debug))]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role_id: u64,
    pub external_provider: String,
    pub external_id: Option<String>,
    pub profile_image: Option<String>,
}

/// Persisted refresh token bookkeeping.
///
/// `token` stays `None` between reservation and finalization.
#[derive(Clone, Serialize, Deserialize)]
#[cfg_attr(any(debug_assertions, test), derive(Debug))]
pub struct RefreshTokenRecord {
    pub id: u64,
    pub token: Option<String>,
    pub user_id: u64,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

/// Single-use password reset token
#[derive(Clone, Serialize, Deserialize)]
#[cfg_attr(any(debug_assertions, test), derive(Debug))]
pub struct PasswordResetToken {
    pub id: u64,
    pub token: String,
    pub user_id: u64,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUserResponse {
    pub id: u64,
    pub username: String,
    pub email: String,
}

#[derive(Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutResponse {
    pub is_success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetClaimsRequest {
    pub user_id: u64,
    pub claim_ids: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestPasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPasswordResetResponse {
    pub is_success: bool,
}

/// Tokens handed out after a successful external identity callback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalAuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(rename = "isNewUser")]
    pub is_new_user: bool,
}
