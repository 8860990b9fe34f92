//! SQLite adapters for the parallax orchestrator.

pub mod connection;
pub mod migrations;
pub mod rate_limit_store;
pub mod research_repository;

pub use connection::{
    create_pool, create_test_pool, verify_connection, ConnectionError, PoolConfig,
};
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
pub use rate_limit_store::SqliteRateLimitStore;
pub use research_repository::{SqliteResearchRepository, MAX_PAGE_SIZE};

use sqlx::SqlitePool;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),
}

/// Open the database at `database_url` and bring the schema up to date.
pub async fn initialize_database(database_url: &str) -> Result<SqlitePool, DatabaseError> {
    let pool = create_pool(database_url, None).await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}

/// Create an in-memory test pool with all migrations applied.
pub async fn create_migrated_test_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = create_test_pool().await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}
