use std::sync::Arc;
use std::time::Duration;

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use thiserror::Error;
use tracing::info;

use crate::repository::{CatalogRepository, ProfileRepository, ProgressStore, Storage};

mod catalog_repo;
mod mapping;
mod migrate;
mod profile_repo;
mod progress_unit;

/// Connection pool sizing.
///
/// Acquisition blocks when every connection is busy; that wait is the only
/// backpressure the engine applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_lifetime: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            max_lifetime: Duration::from_secs(60 * 60),
            idle_timeout: Duration::from_secs(30 * 60),
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("invalid pool configuration: {0}")]
    InvalidPool(String),
}

impl SqliteRepository {
    /// Connect to `SQLite` with the default pool sizing.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the connection cannot be established.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        Self::connect_with(database_url, &PoolConfig::default()).await
    }

    /// Connect to `SQLite` using the given URL and pool sizing.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError::InvalidPool` if `min_connections` exceeds
    /// `max_connections`, or `SqliteInitError::Sqlx` if the connection or the
    /// per-connection pragmas fail.
    pub async fn connect_with(
        database_url: &str,
        config: &PoolConfig,
    ) -> Result<Self, SqliteInitError> {
        if config.max_connections == 0 || config.min_connections > config.max_connections {
            return Err(SqliteInitError::InvalidPool(format!(
                "min {} / max {}",
                config.min_connections, config.max_connections
            )));
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .max_lifetime(config.max_lifetime)
            .idle_timeout(config.idle_timeout)
            .acquire_timeout(config.acquire_timeout)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA foreign_keys = ON;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA busy_timeout = 5000;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA journal_mode = WAL;")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;

        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "connected to sqlite"
        );
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if migration queries fail.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }
}

impl Storage {
    /// Build a `Storage` backed by `SQLite`.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connection or migrations cannot be
    /// completed.
    pub async fn sqlite(database_url: &str, config: &PoolConfig) -> Result<Self, SqliteInitError> {
        let repo = SqliteRepository::connect_with(database_url, config).await?;
        repo.migrate().await?;
        let progress: Arc<dyn ProgressStore> = Arc::new(repo.clone());
        let profiles: Arc<dyn ProfileRepository> = Arc::new(repo.clone());
        let catalog: Arc<dyn CatalogRepository> = Arc::new(repo);
        Ok(Self {
            progress,
            profiles,
            catalog,
        })
    }
}
