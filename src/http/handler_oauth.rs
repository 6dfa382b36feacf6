//! External identity login endpoints.
//!
//! `login` stores a CSRF state in a cookie and redirects to the provider. The
//! `callback` checks that state, completes the code exchange and sends the
//! browser back to the frontend with the session tokens in the URL fragment.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;

use crate::auth::types::ExternalAuthResponse;
use crate::errors::AuthError;
use crate::http::context::AppState;
use crate::oauth::OAuthLinker;

pub const STATE_COOKIE: &str = "oauth_state";

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub state: String,
}

pub async fn handle_oauth_login(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AuthError> {
    let csrf_state = OAuthLinker::new_state()?;
    let login_url = state.oauth_linker.login_url(&csrf_state)?;

    let cookie = Cookie::build((STATE_COOKIE, csrf_state))
        .http_only(true)
        .path("/")
        .max_age(time::Duration::hours(1));

    Ok((jar.add(cookie), Redirect::temporary(&login_url)))
}

pub async fn handle_oauth_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> impl IntoResponse {
    let frontend_url = &state.config.frontend_url;

    let expected_state = jar.get(STATE_COOKIE).map(|cookie| cookie.value().to_string());
    if params.state.is_empty() || expected_state.as_deref() != Some(params.state.as_str()) {
        tracing::warn!("oauth callback state does not match cookie");
        return (jar, error_redirect(frontend_url, "Invalid state"));
    }

    let jar = jar.remove(Cookie::build(STATE_COOKIE).path("/"));

    if params.code.is_empty() {
        return (jar, error_redirect(frontend_url, "Invalid code"));
    }

    match state.oauth_linker.handle_callback(&params.code).await {
        Ok(session) => (jar, success_redirect(frontend_url, &session)),
        Err(err) => {
            tracing::error!(error = ?err, "external login failed");
            (jar, error_redirect(frontend_url, "Failed to handle Google callback"))
        }
    }
}

fn error_redirect(frontend_url: &str, message: &str) -> Redirect {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("message", message)
        .finish();
    Redirect::temporary(&format!("{frontend_url}/auth/error?{query}"))
}

fn success_redirect(frontend_url: &str, session: &ExternalAuthResponse) -> Redirect {
    Redirect::temporary(&format!(
        "{frontend_url}/oauth/google/callback#access_token={}&refresh_token={}&isNewUser={}",
        session.access_token, session.refresh_token, session.is_new_user
    ))
}
