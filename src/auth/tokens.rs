//! HMAC-signed JWT access and refresh tokens.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::auth::types::User;
use crate::config::{AccessTokenMinutes, TokenConfig};
use crate::errors::AuthError;

const BEARER_PREFIX: &str = "Bearer ";

/// Claims carried by an access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub uid: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub role_id: u64,
    /// Effective claim names (role claims merged with direct claims)
    #[serde(default, deserialize_with = "null_as_empty")]
    pub claim_ids: Vec<String>,
    #[serde(default)]
    pub iss: String,
    #[serde(default, with = "audience")]
    pub aud: Vec<String>,
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub iat: i64,
    pub exp: i64,
}

impl AccessTokenClaims {
    /// Numeric account identifier of the token owner
    pub fn user_id(&self) -> Result<u64, AuthError> {
        parse_id(&self.uid)
    }
}

/// Claims carried by a refresh token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    pub uid: String,
    #[serde(rename = "tokenID")]
    pub token_id: String,
    #[serde(default)]
    pub iss: String,
    #[serde(default, with = "audience")]
    pub aud: Vec<String>,
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub iat: i64,
    pub exp: i64,
}

impl RefreshTokenClaims {
    pub fn user_id(&self) -> Result<u64, AuthError> {
        parse_id(&self.uid)
    }

    /// Identifier of the persisted refresh token record
    pub fn token_id(&self) -> Result<u64, AuthError> {
        parse_id(&self.token_id)
    }
}

fn parse_id(value: &str) -> Result<u64, AuthError> {
    value.parse::<u64>().map_err(|err| {
        tracing::error!(error = ?err, value, "token carries a non-numeric identifier");
        AuthError::Internal
    })
}

/// Signs and verifies access and refresh tokens with the configured secrets.
#[derive(Clone)]
pub struct TokenIssuer {
    config: TokenConfig,
}

impl TokenIssuer {
    pub fn new(config: TokenConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Sign an access token for `user` with the configured lifetime.
    pub fn issue_access(&self, user: &User, claim_names: Vec<String>) -> Result<String, AuthError> {
        self.issue_access_with_expiry(user, claim_names, self.config.access_expiration)
    }

    /// Sign an access token for `user` valid for `expiry` from now.
    pub fn issue_access_with_expiry(
        &self,
        user: &User,
        claim_names: Vec<String>,
        expiry: AccessTokenMinutes,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let user_id = user.id.to_string();
        let claims = AccessTokenClaims {
            uid: user_id.clone(),
            email: user.email.clone(),
            username: user.username.clone(),
            role_id: user.role_id,
            claim_ids: claim_names,
            iss: self.config.issuer.clone(),
            aud: vec![self.config.audience.clone()],
            sub: user_id,
            iat: now.timestamp(),
            exp: (now + Duration::minutes(expiry.minutes())).timestamp(),
        };
        sign(&claims, &self.config.access_secret)
    }

    /// Sign a refresh token bound to the refresh token record `token_id`.
    ///
    /// `remember` selects the long lifetime.
    pub fn issue_refresh(
        &self,
        user_id: u64,
        token_id: u64,
        remember: bool,
    ) -> Result<String, AuthError> {
        let days = if remember {
            self.config.refresh_expiration_remember.days()
        } else {
            self.config.refresh_expiration.days()
        };

        let now = Utc::now();
        let claims = RefreshTokenClaims {
            uid: user_id.to_string(),
            token_id: token_id.to_string(),
            iss: self.config.issuer.clone(),
            aud: vec![self.config.audience.clone()],
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::days(days)).timestamp(),
        };
        sign(&claims, &self.config.refresh_secret)
    }

    /// Verify an access token and return its claims.
    ///
    /// Expired tokens are reported as `TokenInvalid`.
    pub fn verify_access(&self, token: &str) -> Result<AccessTokenClaims, AuthError> {
        let claims: AccessTokenClaims =
            decode(token, &self.config.access_secret).map_err(|_| AuthError::TokenInvalid)?;

        if claims.iss != self.config.issuer {
            return Err(AuthError::InvalidIssuer);
        }
        if claims.sub != claims.uid {
            return Err(AuthError::InvalidSubject);
        }
        if !claims.aud.contains(&self.config.audience) {
            return Err(AuthError::InvalidAudience);
        }
        Ok(claims)
    }

    /// Validate a refresh token and return its claims.
    pub fn validate_refresh(&self, token: &str) -> Result<RefreshTokenClaims, AuthError> {
        let claims: RefreshTokenClaims =
            decode(token, &self.config.refresh_secret).map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid,
            })?;

        if claims.iss != self.config.issuer {
            return Err(AuthError::InvalidIssuer);
        }
        if !claims.aud.contains(&self.config.audience) {
            return Err(AuthError::InvalidAudience);
        }
        if claims.exp < Utc::now().timestamp() {
            return Err(AuthError::TokenExpired);
        }
        Ok(claims)
    }
}

/// Token part of an `Authorization` header value, or an empty string when the
/// value does not start with the case-sensitive `Bearer ` prefix.
pub fn extract_bearer(header: &str) -> &str {
    match header.strip_prefix(BEARER_PREFIX) {
        Some(token) if !token.is_empty() => token,
        _ => "",
    }
}

fn sign<T: Serialize>(claims: &T, secret: &str) -> Result<String, AuthError> {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|err| {
        tracing::error!(error = ?err, "token signing failed");
        AuthError::Internal
    })
}

fn decode<T: DeserializeOwned>(token: &str, secret: &str) -> jsonwebtoken::errors::Result<T> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
    validation.validate_aud = false;
    validation.leeway = 0;

    jsonwebtoken::decode::<T>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// `aud` is written as a one-element array and accepted as a string or an array.
mod audience {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    pub fn serialize<S>(value: &[String], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
            Some(OneOrMany::One(value)) => vec![value],
            Some(OneOrMany::Many(values)) => values,
            None => Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::types::LOCAL_PROVIDER;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(TokenConfig::new(
            "access-secret",
            "refresh-secret",
            "knowstack",
            "knowstack",
        ))
    }

    fn user() -> User {
        let now = Utc::now();
        User {
            id: 42,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: String::new(),
            role_id: 3,
            claims: vec![],
            external_provider: LOCAL_PROVIDER.to_string(),
            external_id: None,
            profile_image: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_access_token_round_trip() {
        let issuer = issuer();
        let token = issuer
            .issue_access(&user(), vec!["user:read".to_string(), "user:write".to_string()])
            .unwrap();

        let claims = issuer.verify_access(&token).unwrap();
        assert_eq!(claims.uid, "42");
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role_id, 3);
        assert_eq!(claims.claim_ids, vec!["user:read", "user:write"]);
        assert_eq!(claims.iss, "knowstack");
        assert_eq!(claims.aud, vec!["knowstack"]);
        assert_eq!(claims.exp - claims.iat, 60 * 60);
        assert_eq!(claims.user_id().unwrap(), 42);
    }

    #[test]
    fn test_audience_is_written_as_array() {
        let token = issuer().issue_access(&user(), vec![]).unwrap();
        let payload = token.split('.').nth(1).unwrap();
        let json: serde_json::Value = serde_json::from_slice(
            &base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, payload)
                .unwrap(),
        )
        .unwrap();
        assert_eq!(json["aud"], serde_json::json!(["knowstack"]));
        assert_eq!(json["claim_ids"], serde_json::json!([]));
    }

    #[test]
    fn test_audience_accepts_a_single_string() {
        let claims: AccessTokenClaims = serde_json::from_value(serde_json::json!({
            "uid": "1",
            "claim_ids": null,
            "aud": "knowstack",
            "exp": 1,
        }))
        .unwrap();
        assert_eq!(claims.aud, vec!["knowstack"]);
        assert!(claims.claim_ids.is_empty());
    }

    #[test]
    fn test_issuer_and_audience_changes_are_detected() {
        let token = issuer().issue_access(&user(), vec![]).unwrap();

        let mut config = issuer().config().clone();
        config.issuer = "someone-else".to_string();
        assert_eq!(
            TokenIssuer::new(config).verify_access(&token),
            Err(AuthError::InvalidIssuer)
        );

        let mut config = issuer().config().clone();
        config.audience = "another-app".to_string();
        assert_eq!(
            TokenIssuer::new(config).verify_access(&token),
            Err(AuthError::InvalidAudience)
        );
    }

    #[test]
    fn test_subject_must_match_user() {
        let now = Utc::now().timestamp();
        let claims = AccessTokenClaims {
            uid: "42".to_string(),
            email: String::new(),
            username: String::new(),
            role_id: 0,
            claim_ids: vec![],
            iss: "knowstack".to_string(),
            aud: vec!["knowstack".to_string()],
            sub: "43".to_string(),
            iat: now,
            exp: now + 600,
        };
        let token = sign(&claims, "access-secret").unwrap();
        assert_eq!(
            issuer().verify_access(&token),
            Err(AuthError::InvalidSubject)
        );
    }

    #[test]
    fn test_access_token_failures_are_invalid() {
        let issuer = issuer();
        let token = issuer.issue_access(&user(), vec![]).unwrap();

        let mut config = issuer.config().clone();
        config.access_secret = "rotated".to_string();
        assert_eq!(
            TokenIssuer::new(config).verify_access(&token),
            Err(AuthError::TokenInvalid)
        );
        assert_eq!(issuer.verify_access("not.a.jwt"), Err(AuthError::TokenInvalid));

        let expired = issuer
            .issue_access_with_expiry(&user(), vec![], AccessTokenMinutes::from(-5))
            .unwrap();
        assert_eq!(issuer.verify_access(&expired), Err(AuthError::TokenInvalid));
    }

    #[test]
    fn test_refresh_token_round_trip() {
        let issuer = issuer();
        let token = issuer.issue_refresh(42, 7, false).unwrap();
        let claims = issuer.validate_refresh(&token).unwrap();

        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.token_id().unwrap(), 7);
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 60 * 60);

        let remembered = issuer.issue_refresh(42, 8, true).unwrap();
        let claims = issuer.validate_refresh(&remembered).unwrap();
        assert_eq!(claims.exp - claims.iat, 30 * 24 * 60 * 60);
    }

    #[test]
    fn test_refresh_and_access_secrets_are_separate() {
        let issuer = issuer();
        let refresh = issuer.issue_refresh(42, 7, false).unwrap();
        assert_eq!(issuer.verify_access(&refresh), Err(AuthError::TokenInvalid));

        let access = issuer.issue_access(&user(), vec![]).unwrap();
        assert_eq!(
            issuer.validate_refresh(&access),
            Err(AuthError::TokenInvalid)
        );
    }

    #[test]
    fn test_expired_refresh_token() {
        let now = Utc::now().timestamp();
        let claims = RefreshTokenClaims {
            uid: "42".to_string(),
            token_id: "7".to_string(),
            iss: "knowstack".to_string(),
            aud: vec!["knowstack".to_string()],
            sub: "42".to_string(),
            iat: now - 3600,
            exp: now - 60,
        };
        let token = sign(&claims, "refresh-secret").unwrap();
        assert_eq!(
            issuer().validate_refresh(&token),
            Err(AuthError::TokenExpired)
        );
    }

    #[test]
    fn test_non_numeric_identifiers_are_internal() {
        let now = Utc::now().timestamp();
        let claims = RefreshTokenClaims {
            uid: "42".to_string(),
            token_id: "seven".to_string(),
            iss: "knowstack".to_string(),
            aud: vec!["knowstack".to_string()],
            sub: "42".to_string(),
            iat: now,
            exp: now + 60,
        };
        assert_eq!(claims.token_id(), Err(AuthError::Internal));
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer("Bearer abc.def.ghi"), "abc.def.ghi");
        assert_eq!(extract_bearer("bearer abc"), "");
        assert_eq!(extract_bearer("Bearer "), "");
        assert_eq!(extract_bearer("Basic abc"), "");
        assert_eq!(extract_bearer(""), "");
    }
}
