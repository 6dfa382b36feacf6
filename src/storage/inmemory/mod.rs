//! In-memory storage implementations
//!
//! This module provides an in-memory implementation of all storage traits.
//! It is suitable for development and testing.

mod accounts;
mod tokens;

pub use accounts::MemoryAuthStorage;
