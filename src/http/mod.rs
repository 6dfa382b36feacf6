//! Axum HTTP server handlers and middleware for account and external login endpoints.

pub mod context;
mod handler_health;
mod handler_oauth;
mod handler_user;
pub mod middleware_auth;
pub mod server;

pub use context::AppState;
pub use server::build_router;
