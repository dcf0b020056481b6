//! Lumen Storage
//!
//! `SQLite` persistence for the import engine.
//!
//! # Architecture
//!
//! - **Vertical Slicing**: `sources`, `imports` and `items` each own their
//!   queries as free functions over a [`SqlitePool`]
//! - **Repositories**: [`SqliteRepository`] and [`MemoryRepository`]
//!   implement [`lumen_core::ImportRepository`]
//!
//! # Example
//!
//! ```rust,no_run
//! use lumen_storage::{create_pool, run_migrations, SqliteRepository};
//! use lumen_core::ImportRepository;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = create_pool("sqlite://lumen.db").await?;
//! run_migrations(&pool).await?;
//!
//! let repository = SqliteRepository::new(pool);
//! let sources = repository.get_sources().await?;
//! # Ok(())
//! # }
//! ```

mod codec;
mod error;
mod memory;
mod repository;

// Vertical slices
pub mod imports;
pub mod items;
pub mod sources;

pub use error::{Result, StorageError};
pub use memory::MemoryRepository;
pub use repository::SqliteRepository;

use sqlx::migrate::Migrator;
use sqlx::sqlite::SqlitePool;
use tracing::debug;

// Embed migrations into binary
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Run database migrations
///
/// This should be called once when the application starts to ensure
/// the database schema is up to date.
///
/// # Errors
///
/// Returns an error if migrations fail to run
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    MIGRATOR.run(pool).await?;
    Ok(())
}

/// Create a new `SQLite` pool
///
/// # Arguments
///
/// * `database_url` - `SQLite` connection string (e.g., `<sqlite://lumen.db>`)
///
/// # Errors
///
/// Returns an error if the connection fails
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
    use std::str::FromStr;

    debug!("Creating pool with URL: {}", database_url);

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true) // imports cascade with their source
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
