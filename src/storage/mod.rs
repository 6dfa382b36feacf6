//! Trait-based storage abstractions with in-memory and PostgreSQL backends.

pub mod inmemory;
pub mod traits;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use inmemory::MemoryAuthStorage;
pub use traits::*;

#[cfg(feature = "postgres")]
pub use postgres::PostgresAuthStorage;

use crate::errors::StorageError;
use std::sync::Arc;

/// Storage backend configuration and factory
#[derive(Clone)]
pub enum StorageBackend {
    Memory,
    #[cfg(feature = "postgres")]
    Postgres(String), // Connection string
}

/// Create a storage backend based on configuration.
///
/// The in-memory backend starts with the `user` and `admin` roles so accounts can
/// be registered without an external seeding step.
pub async fn create_storage_backend(
    backend: StorageBackend,
) -> std::result::Result<Arc<dyn AuthStorage>, StorageError> {
    match backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryAuthStorage::seeded()?)),
        #[cfg(feature = "postgres")]
        StorageBackend::Postgres(database_url) => {
            let pool = sqlx::postgres::PgPool::connect(&database_url)
                .await
                .map_err(|e| {
                    StorageError::ConnectionFailed(format!("PostgreSQL connection failed: {}", e))
                })?;

            Ok(Arc::new(postgres::PostgresAuthStorage::new(pool)))
        }
    }
}

/// Parse storage backend from configuration string
pub fn parse_storage_backend(
    backend_name: &str,
    database_url: Option<&str>,
) -> std::result::Result<StorageBackend, StorageError> {
    match backend_name {
        "memory" => Ok(StorageBackend::Memory),
        #[cfg(feature = "postgres")]
        "postgres" => {
            let url = database_url.ok_or_else(|| {
                StorageError::InvalidData("DATABASE_URL required for postgres backend".to_string())
            })?;
            Ok(StorageBackend::Postgres(url.to_string()))
        }
        _ => {
            let _ = database_url;
            Err(StorageError::InvalidData(format!(
                "Unknown storage backend: {}",
                backend_name
            )))
        }
    }
}
