mod batch;
mod error;
mod memory;
pub mod repos;
#[cfg(feature = "database-sqlite")]
pub mod sqlite;

#[cfg(test)]
pub mod tests;

use std::sync::Arc;

pub use batch::{MAX_BATCH_WRITES, WriteBatch, WriteOp};
pub use error::{DbError, DbResult};
pub use memory::MemoryDocumentStore;
pub use repos::*;

use crate::config::StoreConfig;

enum StoreBackend {
    Memory,
    /// A caller-supplied `DocumentStore` implementation.
    Custom,
    #[cfg(feature = "database-sqlite")]
    Sqlite(sqlx::SqlitePool),
}

/// Document store handle, created once per process and shared by the
/// ingestion path and the retention sweeper.
pub struct StorePool {
    backend: StoreBackend,
    documents: Arc<dyn DocumentStore>,
}

impl StorePool {
    /// Create an in-memory store. Contents are lost on restart.
    pub fn in_memory() -> Self {
        Self {
            backend: StoreBackend::Memory,
            documents: Arc::new(MemoryDocumentStore::new()),
        }
    }

    /// Wrap any other `DocumentStore` implementation.
    pub fn from_documents(documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            backend: StoreBackend::Custom,
            documents,
        }
    }

    /// Create a StorePool from an existing SQLite pool.
    /// Primarily useful for testing.
    #[cfg(feature = "database-sqlite")]
    pub fn from_sqlite(pool: sqlx::SqlitePool) -> Self {
        Self {
            documents: Arc::new(sqlite::SqliteDocumentStore::new(pool.clone())),
            backend: StoreBackend::Sqlite(pool),
        }
    }

    /// Create a store from configuration
    pub async fn from_config(config: &StoreConfig) -> DbResult<Self> {
        match config {
            StoreConfig::Memory => Ok(Self::in_memory()),
            #[cfg(feature = "database-sqlite")]
            StoreConfig::Sqlite(cfg) => {
                let pool = sqlx::sqlite::SqlitePoolOptions::new()
                    .max_connections(cfg.max_connections)
                    .connect_with(
                        sqlx::sqlite::SqliteConnectOptions::new()
                            .filename(&cfg.path)
                            .create_if_missing(cfg.create_if_missing)
                            .journal_mode(if cfg.wal_mode {
                                sqlx::sqlite::SqliteJournalMode::Wal
                            } else {
                                sqlx::sqlite::SqliteJournalMode::Delete
                            })
                            .busy_timeout(std::time::Duration::from_millis(cfg.busy_timeout_ms)),
                    )
                    .await?;

                Ok(Self::from_sqlite(pool))
            }
        }
    }

    /// Run schema migrations. A no-op for the in-memory store.
    pub async fn run_migrations(&self) -> DbResult<()> {
        match &self.backend {
            StoreBackend::Memory | StoreBackend::Custom => Ok(()),
            #[cfg(feature = "database-sqlite")]
            StoreBackend::Sqlite(pool) => {
                tracing::info!("Running SQLite migrations");
                sqlx::migrate!("./migrations_sqlx/sqlite").run(pool).await?;
                tracing::info!("SQLite migrations completed successfully");
                Ok(())
            }
        }
    }

    /// Get the document store
    pub fn documents(&self) -> Arc<dyn DocumentStore> {
        Arc::clone(&self.documents)
    }

    /// Short backend name for logs and health output.
    pub fn backend_name(&self) -> &'static str {
        match &self.backend {
            StoreBackend::Memory => "memory",
            StoreBackend::Custom => "custom",
            #[cfg(feature = "database-sqlite")]
            StoreBackend::Sqlite(_) => "sqlite",
        }
    }

    /// Health check for store connectivity
    pub async fn health_check(&self) -> DbResult<()> {
        self.documents.health_check().await
    }
}
