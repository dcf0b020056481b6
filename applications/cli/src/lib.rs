//! Lumen CLI
//!
//! Command-line front-end for the import engine, bundling a folder importer
//! and a library handler over the local `SQLite` database.

pub mod config;
pub mod error;
pub mod folder;
pub mod library;

pub use config::CliConfig;
pub use error::{CliError, Result};
pub use folder::FolderImporterFactory;
pub use library::LibraryHandler;

use lumen_core::ImportRepository;
use lumen_storage::SqliteRepository;
use lumen_sync::ImportManager;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

/// Open the library database and build a manager with the bundled plugins
pub async fn build_manager(config: &CliConfig) -> Result<(ImportManager, SqlitePool)> {
    let pool = lumen_storage::create_pool(&config.storage.database_url).await?;
    lumen_storage::run_migrations(&pool).await?;
    info!("Database ready at {}", config.storage.database_url);

    let repository: Arc<dyn ImportRepository> = Arc::new(SqliteRepository::new(pool.clone()));
    let manager = ImportManager::new(config.sync.clone(), vec![repository])?;

    manager
        .register_importer(Arc::new(FolderImporterFactory::new()))
        .await;
    for handler in LibraryHandler::all(&pool) {
        manager.register_handler(handler).await;
    }

    Ok((manager, pool))
}

/// Re-register every persisted source whose directory is reachable.
///
/// Sources load inactive on startup; registering them again re-enables
/// their items and, with `sync_on_register`, synchronizes them.
pub async fn rediscover_sources(manager: &ImportManager) -> Result<usize> {
    let factory = FolderImporterFactory::new();
    let mut reachable = 0;

    for source in manager.get_sources(None).await {
        if lumen_core::ImporterFactory::can_import(&factory, &source.identifier).await {
            manager.register_source(source).await?;
            reachable += 1;
        } else {
            tracing::warn!("Source {} is not reachable", source.identifier);
        }
    }
    Ok(reachable)
}
