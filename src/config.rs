//! Environment-based configuration types for the knowstack server runtime.

use anyhow::Result;
use std::time::Duration;

use crate::errors::ConfigError;

/// Google OAuth 2.0 authorization endpoint
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google OAuth 2.0 token endpoint
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Google userinfo endpoint returning the profile of the token owner
pub const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Scopes requested from Google during login
pub const GOOGLE_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
];

/// HTTP server port configuration
#[derive(Clone)]
pub struct HttpPort(u16);

/// HTTP client timeout configuration
#[derive(Clone)]
pub struct HttpClientTimeout(Duration);

/// Access token lifetime in minutes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessTokenMinutes(i64);

/// Refresh token lifetime in days
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshTokenDays(i64);

/// Password reset token lifetime in hours
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PasswordResetHours(i64);

/// Browser origins allowed to call the API
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AllowedOrigins(Vec<String>);

/// Whether the refresh flow rejects revoked refresh token records
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnforceRefreshRevocation(bool);

/// Signing material and lifetimes for access and refresh tokens.
///
/// Built once at startup and handed to the token issuer by value.
#[derive(Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_expiration: AccessTokenMinutes,
    pub refresh_expiration: RefreshTokenDays,
    pub refresh_expiration_remember: RefreshTokenDays,
}

impl TokenConfig {
    /// Token configuration with the default lifetimes (60 minutes, 7 days, 30 days)
    pub fn new(
        access_secret: impl Into<String>,
        refresh_secret: impl Into<String>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            access_expiration: AccessTokenMinutes(60),
            refresh_expiration: RefreshTokenDays(7),
            refresh_expiration_remember: RefreshTokenDays(30),
        }
    }
}

/// Google OAuth client configuration
#[derive(Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub scopes: Vec<String>,
}

impl GoogleOAuthConfig {
    /// Client configuration against Google's public endpoints
    pub fn new(client_id: String, client_secret: String, redirect_url: String) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_url,
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
            scopes: GOOGLE_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Main application configuration
#[derive(Clone)]
pub struct Config {
    pub version: String,
    pub http_port: HttpPort,
    pub http_client_timeout: HttpClientTimeout,
    pub user_agent: String,
    pub storage_backend: String,
    pub database_url: Option<String>,
    pub frontend_url: String,
    pub allowed_origins: AllowedOrigins,
    pub tokens: TokenConfig,
    pub hash_secret: String,
    pub password_reset_expiration: PasswordResetHours,
    pub enforce_refresh_revocation: EnforceRefreshRevocation,
    pub google: GoogleOAuthConfig,
}

impl Config {
    /// Create a new configuration from environment variables
    pub fn new() -> Result<Self> {
        let default_user_agent = format!("knowstack/{}", version()?);
        let http_port: HttpPort = default_env("HTTP_PORT", "8080").try_into()?;
        let http_client_timeout: HttpClientTimeout =
            default_env("HTTP_CLIENT_TIMEOUT", "10s").try_into()?;
        let user_agent = default_env("USER_AGENT", &default_user_agent);
        let storage_backend = default_env("STORAGE_BACKEND", "memory");
        let database_url = optional_env("DATABASE_URL");
        let frontend_url = parse_url(
            "FRONTEND_URL",
            default_env("FRONTEND_URL", "http://localhost:3000"),
        )?;
        let allowed_origins: AllowedOrigins = default_env(
            "ALLOWED_ORIGINS",
            "http://localhost:3000,http://localhost:5173",
        )
        .into();

        let tokens = TokenConfig {
            access_secret: default_env("JWT_SECRET", "dev_secret"),
            refresh_secret: default_env("JWT_REFRESH_SECRET", "dev_refresh_secret"),
            issuer: default_env("JWT_ISSUER", "knowstack"),
            audience: default_env("JWT_AUDIENCE", "knowstack"),
            access_expiration: default_env("JWT_EXPIRES_IN_MIN", "60").try_into()?,
            refresh_expiration: default_env("JWT_REFRESH_EXPIRES_IN_DAYS", "7").try_into()?,
            refresh_expiration_remember: default_env("JWT_REFRESH_EXPIRES_IN_DAYS_REMEMBER", "30")
                .try_into()?,
        };

        let hash_secret = default_env("HASH_SECRET", "");
        if hash_secret.is_empty() {
            tracing::warn!("HASH_SECRET is empty; password digests are keyed by salt only");
        }

        let password_reset_expiration: PasswordResetHours =
            default_env("PASSWORD_RESET_EXPIRES_IN_HOURS", "1").try_into()?;
        let enforce_refresh_revocation: EnforceRefreshRevocation =
            default_env("REFRESH_ENFORCE_REVOCATION", "false").try_into()?;

        let google = GoogleOAuthConfig::new(
            default_env("GOOGLE_CLIENT_ID", ""),
            default_env("GOOGLE_CLIENT_SECRET", ""),
            default_env("GOOGLE_REDIRECT_URL", ""),
        );

        Ok(Self {
            version: version()?,
            http_port,
            http_client_timeout,
            user_agent,
            storage_backend,
            database_url,
            frontend_url,
            allowed_origins,
            tokens,
            hash_secret,
            password_reset_expiration,
            enforce_refresh_revocation,
            google,
        })
    }
}

/// Get application version from build environment
pub fn version() -> Result<String> {
    option_env!("GIT_HASH")
        .or(option_env!("CARGO_PKG_VERSION"))
        .map(|val| val.to_string())
        .ok_or(ConfigError::VersionNotSet.into())
}

pub(crate) fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn default_env(name: &str, default_value: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default_value.to_string())
}

fn parse_url(name: &str, value: String) -> Result<String, ConfigError> {
    url::Url::parse(&value)
        .map_err(|e| ConfigError::UrlParsingFailed(format!("{name}={value}"), e.to_string()))?;
    Ok(value.trim_end_matches('/').to_string())
}

fn parse_positive(value: &str) -> Result<i64, ConfigError> {
    match value.trim().parse::<i64>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        Ok(parsed) => Err(ConfigError::IntegerParsingFailed(
            value.to_string(),
            format!("{parsed} is not positive"),
        )),
        Err(err) => Err(ConfigError::IntegerParsingFailed(
            value.to_string(),
            err.to_string(),
        )),
    }
}

impl TryFrom<String> for HttpPort {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Ok(Self(8080))
        } else {
            value
                .parse::<u16>()
                .map(Self)
                .map_err(|err| ConfigError::PortParsingFailed(err).into())
        }
    }
}

impl AsRef<u16> for HttpPort {
    fn as_ref(&self) -> &u16 {
        &self.0
    }
}

impl TryFrom<String> for HttpClientTimeout {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Ok(Self(Duration::from_secs(10)));
        }
        duration_str::parse(&value)
            .map(Self)
            .map_err(|e| ConfigError::DurationParsingFailed(value, e.to_string()))
    }
}

impl AsRef<Duration> for HttpClientTimeout {
    fn as_ref(&self) -> &Duration {
        &self.0
    }
}

impl TryFrom<String> for AccessTokenMinutes {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_positive(&value).map(Self)
    }
}

impl AccessTokenMinutes {
    pub fn minutes(&self) -> i64 {
        self.0
    }
}

impl From<i64> for AccessTokenMinutes {
    fn from(minutes: i64) -> Self {
        Self(minutes)
    }
}

impl TryFrom<String> for RefreshTokenDays {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_positive(&value).map(Self)
    }
}

impl RefreshTokenDays {
    pub fn days(&self) -> i64 {
        self.0
    }
}

impl From<i64> for RefreshTokenDays {
    fn from(days: i64) -> Self {
        Self(days)
    }
}

impl TryFrom<String> for PasswordResetHours {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_positive(&value).map(Self)
    }
}

impl PasswordResetHours {
    pub fn as_duration(&self) -> chrono::Duration {
        chrono::Duration::hours(self.0)
    }
}

impl From<i64> for PasswordResetHours {
    fn from(hours: i64) -> Self {
        Self(hours)
    }
}

impl From<String> for AllowedOrigins {
    fn from(value: String) -> Self {
        Self(
            value
                .split(',')
                .map(|origin| origin.trim().trim_end_matches('/').to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
        )
    }
}

impl AsRef<Vec<String>> for AllowedOrigins {
    fn as_ref(&self) -> &Vec<String> {
        &self.0
    }
}

impl TryFrom<String> for EnforceRefreshRevocation {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Self(true)),
            "false" | "0" | "no" | "off" => Ok(Self(false)),
            _ => Err(ConfigError::BoolParsingFailed(value)),
        }
    }
}

impl AsRef<bool> for EnforceRefreshRevocation {
    fn as_ref(&self) -> &bool {
        &self.0
    }
}

impl From<bool> for EnforceRefreshRevocation {
    fn from(value: bool) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_lifetimes_must_be_positive_integers() {
        assert_eq!(
            AccessTokenMinutes::try_from("15".to_string()).unwrap().minutes(),
            15
        );
        assert_eq!(
            RefreshTokenDays::try_from(" 30 ".to_string()).unwrap().days(),
            30
        );

        let err = AccessTokenMinutes::try_from("sixty".to_string()).unwrap_err();
        assert!(err.to_string().starts_with("error-knowstack-config-3"));

        assert!(RefreshTokenDays::try_from("0".to_string()).is_err());
        assert!(RefreshTokenDays::try_from("-7".to_string()).is_err());
    }

    #[test]
    fn test_http_client_timeout_parsing() {
        let timeout = HttpClientTimeout::try_from("5s".to_string()).unwrap();
        assert_eq!(*timeout.as_ref(), Duration::from_secs(5));

        let timeout = HttpClientTimeout::try_from("2m".to_string()).unwrap();
        assert_eq!(*timeout.as_ref(), Duration::from_secs(120));

        let timeout = HttpClientTimeout::try_from(String::new()).unwrap();
        assert_eq!(*timeout.as_ref(), Duration::from_secs(10));

        assert!(HttpClientTimeout::try_from("soon".to_string()).is_err());
    }

    #[test]
    fn test_enforce_refresh_revocation_parsing() {
        for value in ["true", "1", "YES", "on"] {
            let parsed = EnforceRefreshRevocation::try_from(value.to_string()).unwrap();
            assert!(*parsed.as_ref(), "{value} should enable enforcement");
        }
        for value in ["false", "0", "no", "OFF"] {
            let parsed = EnforceRefreshRevocation::try_from(value.to_string()).unwrap();
            assert!(!*parsed.as_ref(), "{value} should disable enforcement");
        }
        assert!(EnforceRefreshRevocation::try_from("maybe".to_string()).is_err());
    }

    #[test]
    fn test_allowed_origins_parsing() {
        let origins = AllowedOrigins::from(" http://localhost:3000, https://app.example.com/ ,".to_string());
        assert_eq!(
            origins.as_ref(),
            &vec![
                "http://localhost:3000".to_string(),
                "https://app.example.com".to_string()
            ]
        );
        assert!(AllowedOrigins::from(String::new()).as_ref().is_empty());
    }

    #[test]
    fn test_http_port_parsing() {
        let port = HttpPort::try_from(String::new()).unwrap();
        assert_eq!(*port.as_ref(), 8080);
        let port = HttpPort::try_from("3000".to_string()).unwrap();
        assert_eq!(*port.as_ref(), 3000);
        assert!(HttpPort::try_from("70000".to_string()).is_err());
    }

    #[test]
    fn test_frontend_url_is_normalized() {
        let url = parse_url("FRONTEND_URL", "http://localhost:3000/".to_string()).unwrap();
        assert_eq!(url, "http://localhost:3000");
        assert!(parse_url("FRONTEND_URL", "not a url".to_string()).is_err());
    }

    #[test]
    fn test_google_defaults() {
        let google = GoogleOAuthConfig::new(
            "client".to_string(),
            "secret".to_string(),
            "http://localhost:8080/oauth/google/callback".to_string(),
        );
        assert_eq!(google.auth_url, GOOGLE_AUTH_URL);
        assert_eq!(google.scopes.len(), 2);
    }
}
