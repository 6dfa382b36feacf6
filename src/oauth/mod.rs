//! External identity login: provider integration and account linking.

pub mod linker;
pub mod provider;

pub use linker::OAuthLinker;
pub use provider::{ExternalProfile, GoogleProvider, IdentityProvider};
