// Persistence layer: backend-agnostic repository over SQLite or PostgreSQL

pub mod compress;
pub mod database;
pub mod models;
pub mod repository;

pub use compress::{gunzip_bytes, gzip_bytes};
pub use database::{create_repository, DatabasePool, SCHEMA_VERSION};
pub use repository::{BulletinRepository, SqliteRepository};

#[cfg(feature = "postgres")]
pub use repository::PostgresRepository;
