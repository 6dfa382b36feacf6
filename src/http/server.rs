//! Main router configuration assembling the account and external login endpoints.

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AllowedOrigins;

use super::{
    context::AppState,
    handler_health::handle_health,
    handler_oauth::{handle_oauth_callback, handle_oauth_login},
    handler_user::{
        handle_login, handle_logout, handle_me, handle_refresh, handle_register,
        handle_request_password_reset, handle_set_claims,
    },
};

/// Build the application router
pub fn build_router(ctx: AppState) -> Router {
    let user_routes = Router::new()
        .route("/register", post(handle_register))
        .route("/login", post(handle_login))
        .route("/refresh", post(handle_refresh))
        .route("/logout", post(handle_logout))
        .route("/claims", post(handle_set_claims))
        .route("/password-reset", post(handle_request_password_reset))
        .route("/me", get(handle_me));

    let api_routes = Router::new()
        .route("/health", get(handle_health))
        .nest("/users", user_routes);

    let oauth_routes = Router::new()
        .route("/google/login", get(handle_oauth_login))
        .route("/google/callback", get(handle_oauth_callback));

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/oauth", oauth_routes)
        .layer(cors_layer(&ctx.config.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// CORS for the configured frontend origins; credentials are allowed so the
/// OAuth state cookie survives the provider round trip.
fn cors_layer(allowed_origins: &AllowedOrigins) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .as_ref()
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(%origin, error = ?err, "ignoring invalid allowed origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        Config, EnforceRefreshRevocation, GoogleOAuthConfig, PasswordResetHours, TokenConfig,
    };
    use crate::oauth::GoogleProvider;
    use crate::storage::MemoryAuthStorage;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::json;
    use std::sync::Arc;

    fn create_test_app_state() -> AppState {
        let config = Config {
            version: "test".to_string(),
            http_port: "3000".to_string().try_into().unwrap(),
            http_client_timeout: "10s".to_string().try_into().unwrap(),
            user_agent: "test-user-agent".to_string(),
            storage_backend: "memory".to_string(),
            database_url: None,
            frontend_url: "http://localhost:3000".to_string(),
            allowed_origins: "http://localhost:3000".to_string().into(),
            tokens: TokenConfig::new("access", "refresh", "knowstack", "knowstack"),
            hash_secret: "pepper".to_string(),
            password_reset_expiration: PasswordResetHours::from(1),
            enforce_refresh_revocation: EnforceRefreshRevocation::from(false),
            google: GoogleOAuthConfig::new(
                "client".to_string(),
                "secret".to_string(),
                "http://localhost:8080/oauth/google/callback".to_string(),
            ),
        };
        let storage = Arc::new(MemoryAuthStorage::seeded().unwrap());
        let provider = Arc::new(GoogleProvider::new(
            reqwest::Client::new(),
            config.google.clone(),
        ));
        AppState::new(config, storage, provider)
    }

    fn create_test_server() -> TestServer {
        TestServer::new(build_router(create_test_app_state())).unwrap()
    }

    #[test]
    fn test_invalid_origins_are_skipped() {
        let origins = AllowedOrigins::from("http://localhost:3000,bad\norigin".to_string());
        let _cors = cors_layer(&origins);
    }

    #[tokio::test]
    async fn test_health() {
        let server = create_test_server();
        let response = server.get("/api/v1/health").await;
        response.assert_status_ok();
        response.assert_json(&json!({"status": "UP", "service": "liveness"}));
    }

    #[tokio::test]
    async fn test_register_login_and_me() {
        let server = create_test_server();

        let response = server
            .post("/api/v1/users/register")
            .json(&json!({
                "username": "alice",
                "email": "alice@example.com",
                "password": "correct-horse"
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let created: serde_json::Value = response.json();
        assert_eq!(created["username"], "alice");

        let response = server
            .post("/api/v1/users/login")
            .json(&json!({"email": "alice@example.com", "password": "correct-horse"}))
            .await;
        response.assert_status_ok();
        let login: serde_json::Value = response.json();
        let access_token = login["accessToken"].as_str().unwrap().to_string();
        assert!(login["refreshToken"].as_str().is_some());

        let response = server
            .get("/api/v1/users/me")
            .authorization_bearer(&access_token)
            .await;
        response.assert_status_ok();
        let claims: serde_json::Value = response.json();
        assert_eq!(claims["username"], "alice");
        assert_eq!(claims["email"], "alice@example.com");
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_conflict() {
        let server = create_test_server();
        let body = json!({
            "username": "alice",
            "email": "alice@example.com",
            "password": "correct-horse"
        });
        server
            .post("/api/v1/users/register")
            .json(&body)
            .await
            .assert_status(StatusCode::CREATED);

        let response = server.post("/api/v1/users/register").json(&body).await;
        response.assert_status(StatusCode::CONFLICT);
        let error: serde_json::Value = response.json();
        assert!(error["title"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_wrong_password_is_rejected() {
        let server = create_test_server();
        server
            .post("/api/v1/users/register")
            .json(&json!({
                "username": "alice",
                "email": "alice@example.com",
                "password": "correct-horse"
            }))
            .await;

        let response = server
            .post("/api/v1/users/login")
            .json(&json!({"email": "alice@example.com", "password": "wrong-horse"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_set_claims_requires_bearer_and_claim() {
        let server = create_test_server();

        let response = server
            .post("/api/v1/users/claims")
            .json(&json!({"user_id": 1, "claim_ids": [1]}))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);

        server
            .post("/api/v1/users/register")
            .json(&json!({
                "username": "alice",
                "email": "alice@example.com",
                "password": "correct-horse"
            }))
            .await;
        let login: serde_json::Value = server
            .post("/api/v1/users/login")
            .json(&json!({"email": "alice@example.com", "password": "correct-horse"}))
            .await
            .json();
        let access_token = login["accessToken"].as_str().unwrap().to_string();

        let response = server
            .post("/api/v1/users/claims")
            .authorization_bearer(&access_token)
            .json(&json!({"user_id": 1, "claim_ids": [1]}))
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_google_login_sets_state_cookie() {
        let server = create_test_server();
        let response = server.get("/oauth/google/login").await;
        response.assert_status(StatusCode::TEMPORARY_REDIRECT);

        let location = response.header(header::LOCATION);
        let location = location.to_str().unwrap();
        let state = response.cookie("oauth_state");
        assert!(location.starts_with("https://accounts.google.com/"));
        assert!(location.contains("state="));
        assert_eq!(state.http_only(), Some(true));
        assert_eq!(state.path(), Some("/"));
    }

    #[tokio::test]
    async fn test_google_callback_rejects_missing_state() {
        let server = create_test_server();
        let response = server
            .get("/oauth/google/callback")
            .add_query_param("code", "abc")
            .add_query_param("state", "forged")
            .await;
        response.assert_status(StatusCode::TEMPORARY_REDIRECT);
        let location = response.header(header::LOCATION);
        assert_eq!(
            location.to_str().unwrap(),
            "http://localhost:3000/auth/error?message=Invalid+state"
        );
    }
}
