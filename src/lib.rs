//! Knowstack authentication service library crate.
//!
//! Provides local account registration and login, HMAC-signed access and refresh
//! tokens, claim-based authorization and external identity login for the
//! Knowstack API.

pub mod auth;
pub mod config;
pub mod errors;
pub mod http;
pub mod oauth;
pub mod storage;
