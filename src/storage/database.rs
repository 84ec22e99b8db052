// Database connection and pool management

use sqlx::{migrate::MigrateDatabase, Pool, Sqlite};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[cfg(feature = "postgres")]
use sqlx::Postgres;

use crate::config::{StorageBackend, StorageConfig};
use crate::domain::{BulletinError, Result};

use super::repository::{BulletinRepository, SqliteRepository};
#[cfg(feature = "postgres")]
use super::repository::PostgresRepository;

/// Expected schema version; a stored value that differs is a startup failure,
/// never a silent migration.
pub const SCHEMA_VERSION: i64 = 1;

/// Unified database pool over the two supported backends.
#[derive(Clone)]
pub enum DatabasePool {
    Sqlite(Pool<Sqlite>),
    #[cfg(feature = "postgres")]
    Postgres(Pool<Postgres>),
}

impl DatabasePool {
    /// Connect to the configured backend, run migrations, and verify the
    /// schema version.
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let pool = match config.backend {
            StorageBackend::Embedded => Self::connect_sqlite(config).await?,
            #[cfg(feature = "postgres")]
            StorageBackend::Server => Self::connect_postgres(config).await?,
            #[cfg(not(feature = "postgres"))]
            StorageBackend::Server => {
                return Err(BulletinError::config(
                    "server backend requires the 'postgres' feature",
                ))
            }
        };

        pool.run_migrations().await?;
        pool.check_schema_version().await?;
        Ok(pool)
    }

    async fn connect_sqlite(config: &StorageConfig) -> Result<Self> {
        info!("Creating SQLite connection pool: {}", config.dsn);

        if !config.dsn.contains(":memory:") && !Sqlite::database_exists(&config.dsn).await? {
            info!("Creating SQLite database: {}", config.dsn);
            Sqlite::create_database(&config.dsn).await?;
        }

        // A pooled in-memory database would give each connection its own
        // empty store; pin it to a single connection.
        let max_connections = if config.dsn.contains(":memory:") {
            1
        } else {
            config.pool_size
        };

        let options = sqlx::sqlite::SqliteConnectOptions::from_str(&config.dsn)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(30))
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(DatabasePool::Sqlite(pool))
    }

    #[cfg(feature = "postgres")]
    async fn connect_postgres(config: &StorageConfig) -> Result<Self> {
        info!("Creating PostgreSQL connection pool");

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.dsn)
            .await?;

        Ok(DatabasePool::Postgres(pool))
    }

    pub async fn run_migrations(&self) -> Result<()> {
        match self {
            DatabasePool::Sqlite(pool) => {
                info!("Running SQLite migrations");
                sqlx::migrate!("./migrations").run(pool).await?;
            }
            #[cfg(feature = "postgres")]
            DatabasePool::Postgres(pool) => {
                info!("Running PostgreSQL migrations");
                sqlx::migrate!("./migrations_postgres").run(pool).await?;
            }
        }
        Ok(())
    }

    /// Compare the stored schema version against [`SCHEMA_VERSION`].
    pub async fn check_schema_version(&self) -> Result<()> {
        let found: i64 = match self {
            DatabasePool::Sqlite(pool) => {
                sqlx::query_scalar("SELECT version FROM schema_meta")
                    .fetch_one(pool)
                    .await?
            }
            #[cfg(feature = "postgres")]
            DatabasePool::Postgres(pool) => {
                sqlx::query_scalar("SELECT version FROM schema_meta")
                    .fetch_one(pool)
                    .await?
            }
        };

        if found != SCHEMA_VERSION {
            return Err(BulletinError::SchemaVersion {
                expected: SCHEMA_VERSION,
                found,
            });
        }
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        match self {
            DatabasePool::Sqlite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
            #[cfg(feature = "postgres")]
            DatabasePool::Postgres(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
        }
        Ok(())
    }

    pub async fn close(&self) {
        match self {
            DatabasePool::Sqlite(pool) => pool.close().await,
            #[cfg(feature = "postgres")]
            DatabasePool::Postgres(pool) => pool.close().await,
        }
    }
}

/// Build the process-wide repository from configuration. The backend choice
/// is made exactly once here; callers only ever see the trait object.
pub async fn create_repository(config: &StorageConfig) -> Result<Arc<dyn BulletinRepository>> {
    let pool = DatabasePool::connect(config).await?;
    match pool {
        DatabasePool::Sqlite(pool) => Ok(Arc::new(SqliteRepository::new(pool))),
        #[cfg(feature = "postgres")]
        DatabasePool::Postgres(pool) => Ok(Arc::new(PostgresRepository::new(pool))),
    }
}
