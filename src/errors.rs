//! Standardized error types following the `error-knowstack-<domain>-<number>` format.

use std::fmt;

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde_json::json;
use thiserror::Error;

/// Configuration errors that occur during application startup
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error when PORT cannot be parsed
    #[error("error-knowstack-config-1 Parsing HTTP_PORT into u16 failed: {0:?}")]
    PortParsingFailed(std::num::ParseIntError),

    /// Error when version information is not available
    #[error("error-knowstack-config-2 One of GIT_HASH or CARGO_PKG_VERSION must be set")]
    VersionNotSet,

    /// Error when an integer setting cannot be parsed
    #[error("error-knowstack-config-3 Failed to parse {0} as a positive integer: {1}")]
    IntegerParsingFailed(String, String),

    /// Error when duration string cannot be parsed
    #[error("error-knowstack-config-4 Failed to parse duration '{0}': {1}")]
    DurationParsingFailed(String, String),

    /// Error when boolean string cannot be parsed
    #[error(
        "error-knowstack-config-5 Failed to parse boolean '{0}': expected true/false/1/0/yes/no/on/off"
    )]
    BoolParsingFailed(String),

    /// Error when a URL setting cannot be parsed
    #[error("error-knowstack-config-6 Failed to parse URL '{0}': {1}")]
    UrlParsingFailed(String, String),
}

/// Database/storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Error when database connection fails
    #[error("error-knowstack-storage-1 Database connection failed: {0}")]
    ConnectionFailed(String),

    /// Error when query execution fails
    #[error("error-knowstack-storage-2 Query execution failed: {0}")]
    QueryFailed(String),

    /// Error when database operation fails
    #[error("error-knowstack-storage-3 Database error: {0}")]
    DatabaseError(String),

    /// Error when data validation fails
    #[error("error-knowstack-storage-4 Invalid data: {0}")]
    InvalidData(String),

    /// Error when requested resource is not found
    #[error("error-knowstack-storage-5 Not found: {0}")]
    NotFound(String),

    /// Error when a write violates a uniqueness constraint; carries the column name
    #[error("error-knowstack-storage-6 Unique constraint violated: {0}")]
    Conflict(String),

    /// Error when an in-process lock has been poisoned
    #[error("error-knowstack-storage-7 Lock error: {0}")]
    LockFailed(String),
}

/// Account field that collided with an existing account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingField {
    Username,
    Email,
}

/// Kind of record an authentication operation could not find
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingEntity {
    User,
    Claims,
    DefaultRole,
    TokenRecord,
}

/// Pair of identifiers that were expected to agree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchKind {
    TokenAndUser,
}

impl fmt::Display for ExistingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExistingField::Username => write!(f, "username"),
            ExistingField::Email => write!(f, "email"),
        }
    }
}

impl fmt::Display for MissingEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingEntity::User => write!(f, "user"),
            MissingEntity::Claims => write!(f, "claims"),
            MissingEntity::DefaultRole => write!(f, "default role"),
            MissingEntity::TokenRecord => write!(f, "token record"),
        }
    }
}

impl fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MismatchKind::TokenAndUser => write!(f, "token and user"),
        }
    }
}

/// Authentication and credential errors.
///
/// `Internal` and `UpstreamFailure` never carry the underlying error text; the
/// cause is logged where it happens and callers only see the kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("error-knowstack-auth-1 {0} already exists")]
    AlreadyExists(ExistingField),

    #[error("error-knowstack-auth-2 {0} not found")]
    NotFound(MissingEntity),

    #[error("error-knowstack-auth-3 Invalid credential")]
    InvalidCredential,

    #[error("error-knowstack-auth-4 Invalid token")]
    TokenInvalid,

    #[error("error-knowstack-auth-5 Invalid token issuer")]
    InvalidIssuer,

    #[error("error-knowstack-auth-6 Invalid token audience")]
    InvalidAudience,

    #[error("error-knowstack-auth-7 Invalid token subject")]
    InvalidSubject,

    #[error("error-knowstack-auth-8 Token expired")]
    TokenExpired,

    #[error("error-knowstack-auth-9 {0} mismatch")]
    Mismatch(MismatchKind),

    #[error("error-knowstack-auth-10 Identity provider request failed")]
    UpstreamFailure,

    #[error("error-knowstack-auth-11 Internal error")]
    Internal,

    #[error("error-knowstack-auth-12 Invalid request: {0}")]
    InvalidRequest(String),

    #[error("error-knowstack-auth-13 Missing required claims")]
    Forbidden,
}

impl AuthError {
    /// Stable snake_case identifier used in HTTP error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::AlreadyExists(ExistingField::Username) => "username_already_exists",
            AuthError::AlreadyExists(ExistingField::Email) => "email_already_exists",
            AuthError::NotFound(MissingEntity::User) => "user_not_found",
            AuthError::NotFound(MissingEntity::Claims) => "claims_not_found",
            AuthError::NotFound(MissingEntity::DefaultRole) => "default_role_not_found",
            AuthError::NotFound(MissingEntity::TokenRecord) => "token_not_found",
            AuthError::InvalidCredential => "invalid_password",
            AuthError::TokenInvalid => "invalid_token",
            AuthError::InvalidIssuer => "invalid_issuer",
            AuthError::InvalidAudience => "invalid_audience",
            AuthError::InvalidSubject => "invalid_subject",
            AuthError::TokenExpired => "token_expired",
            AuthError::Mismatch(MismatchKind::TokenAndUser) => "token_user_mismatch",
            AuthError::UpstreamFailure => "upstream_failure",
            AuthError::Internal => "internal_server_error",
            AuthError::InvalidRequest(_) => "invalid_request",
            AuthError::Forbidden => "forbidden",
        }
    }

    /// HTTP status associated with the error kind
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::AlreadyExists(_) => StatusCode::CONFLICT,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::InvalidCredential | AuthError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AuthError::TokenInvalid
            | AuthError::InvalidIssuer
            | AuthError::InvalidAudience
            | AuthError::InvalidSubject
            | AuthError::TokenExpired
            | AuthError::Mismatch(_) => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::UpstreamFailure => StatusCode::BAD_GATEWAY,
            AuthError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the caller has to sign in again to obtain a usable session
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, AuthError::TokenExpired | AuthError::TokenInvalid)
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(ref column) if column == "username" => {
                AuthError::AlreadyExists(ExistingField::Username)
            }
            StorageError::Conflict(ref column) if column == "email" => {
                AuthError::AlreadyExists(ExistingField::Email)
            }
            err => {
                tracing::error!(error = ?err, "storage operation failed");
                AuthError::Internal
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        }
        let body = json!({
            "type": self.kind(),
            "title": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_conflict_maps_to_already_exists() {
        let err: AuthError = StorageError::Conflict("username".to_string()).into();
        assert_eq!(err, AuthError::AlreadyExists(ExistingField::Username));

        let err: AuthError = StorageError::Conflict("email".to_string()).into();
        assert_eq!(err, AuthError::AlreadyExists(ExistingField::Email));
    }

    #[test]
    fn test_unexpected_storage_errors_hide_their_text() {
        let err: AuthError =
            StorageError::DatabaseError("password authentication failed for user".to_string())
                .into();
        assert_eq!(err, AuthError::Internal);
        assert!(!err.to_string().contains("password authentication"));

        let err: AuthError = StorageError::Conflict("external_id".to_string()).into();
        assert_eq!(err, AuthError::Internal);
    }

    #[test]
    fn test_reauthentication_kinds() {
        assert!(AuthError::TokenExpired.requires_reauthentication());
        assert!(AuthError::TokenInvalid.requires_reauthentication());
        assert!(!AuthError::InvalidIssuer.requires_reauthentication());
        assert!(!AuthError::InvalidAudience.requires_reauthentication());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AuthError::AlreadyExists(ExistingField::Email).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AuthError::NotFound(MissingEntity::TokenRecord).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(AuthError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            AuthError::UpstreamFailure.status_code(),
            StatusCode::BAD_GATEWAY
        );
    }
}
