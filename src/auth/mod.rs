//! Credential hashing, token issuance and verification, claim resolution and the
//! local account operations built on top of them.

pub mod claims;
pub mod password;
pub mod refresh;
pub mod service;
pub mod tokens;
pub mod types;

pub use claims::{authorize, effective_claims, merge_claims};
pub use password::PasswordHasher;
pub use refresh::RefreshTokenRotator;
pub use service::AccountService;
pub use tokens::{AccessTokenClaims, RefreshTokenClaims, TokenIssuer, extract_bearer};
