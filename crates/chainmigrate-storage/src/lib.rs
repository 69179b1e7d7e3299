//! chainmigrate-storage — storage backends for ChainMigrate.
//!
//! Every backend implements both [`MigrationStore`] and [`KeyValueStore`]:
//! - [`memory`]: in-memory (tests and dry runs, no persistence)
//! - `sqlite`: SQLite via `sqlx` (feature `sqlite`)
//! - `postgres`: PostgreSQL via `sqlx` (feature `postgres`)

use std::sync::Arc;

use chainmigrate_core::error::MigratorError;
use chainmigrate_core::kv::KeyValueStore;
use chainmigrate_core::store::MigrationStore;

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryStorage;

/// The two collaborator handles of one opened backend.
#[derive(Clone)]
pub struct StorageHandles {
    pub migrations: Arc<dyn MigrationStore>,
    pub kv: Arc<dyn KeyValueStore>,
}

impl StorageHandles {
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: MigrationStore + KeyValueStore + 'static,
    {
        Self {
            migrations: backend.clone(),
            kv: backend,
        }
    }
}

/// Open a backend from a URL: `memory`, `sqlite:<path>` or `postgres://…`.
pub async fn open(url: &str) -> Result<StorageHandles, MigratorError> {
    if url == "memory" {
        return Ok(StorageHandles::from_backend(Arc::new(InMemoryStorage::new())));
    }
    if url.starts_with("sqlite:") {
        #[cfg(feature = "sqlite")]
        {
            let backend = sqlite::SqliteStorage::open(url).await?;
            return Ok(StorageHandles::from_backend(Arc::new(backend)));
        }
        #[cfg(not(feature = "sqlite"))]
        return Err(MigratorError::Config("built without the `sqlite` feature".into()));
    }
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        #[cfg(feature = "postgres")]
        {
            let backend = postgres::PostgresStorage::connect(url).await?;
            return Ok(StorageHandles::from_backend(Arc::new(backend)));
        }
        #[cfg(not(feature = "postgres"))]
        return Err(MigratorError::Config("built without the `postgres` feature".into()));
    }
    Err(MigratorError::Config(format!("unsupported database url '{url}'")))
}

/// Decode a stored base-10 amount.
#[cfg(any(feature = "sqlite", feature = "postgres", test))]
pub(crate) fn parse_amount(s: &str) -> Result<alloy_primitives::U256, MigratorError> {
    s.parse::<alloy_primitives::U256>()
        .map_err(|e| MigratorError::Storage(format!("invalid stored amount '{s}': {e}")))
}
