//! `SQLite` backed import repository

use crate::{imports, sources};
use async_trait::async_trait;
use chrono::Utc;
use lumen_core::{Import, ImportRepository, MediaType, Result, Source};
use sqlx::SqlitePool;
use tracing::debug;

/// Persists sources and imports in the `import_sources` and `imports` tables
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Create a repository over a migrated pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ImportRepository for SqliteRepository {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get_sources(&self) -> Result<Vec<Source>> {
        Ok(sources::get_all(&self.pool).await?)
    }

    async fn get_source(&self, identifier: &str) -> Result<Option<Source>> {
        Ok(sources::get_by_identifier(&self.pool, identifier).await?)
    }

    async fn add_source(&self, source: &Source) -> Result<()> {
        sources::insert(&self.pool, source).await?;
        debug!("Stored source {}", source.identifier);
        Ok(())
    }

    async fn update_source(&self, source: &Source) -> Result<()> {
        Ok(sources::update(&self.pool, source).await?)
    }

    async fn remove_source(&self, identifier: &str) -> Result<()> {
        sources::delete(&self.pool, identifier).await?;
        debug!("Deleted source {} and its imports", identifier);
        Ok(())
    }

    async fn get_imports(&self) -> Result<Vec<Import>> {
        Ok(imports::get_all(&self.pool).await?)
    }

    async fn get_import(&self, path: &str, media_type: &MediaType) -> Result<Option<Import>> {
        Ok(imports::get(&self.pool, path, media_type).await?)
    }

    async fn add_import(&self, import: &Import) -> Result<()> {
        imports::insert(&self.pool, import).await?;
        debug!("Stored import {}", import.key());
        Ok(())
    }

    async fn update_import(&self, import: &Import) -> Result<()> {
        Ok(imports::update_settings(&self.pool, &import.path, &import.media_type, &import.settings).await?)
    }

    async fn remove_import(&self, path: &str, media_type: &MediaType) -> Result<()> {
        Ok(imports::delete(&self.pool, path, media_type).await?)
    }

    async fn update_last_sync(&self, import: &Import) -> Result<()> {
        let when = import.last_synced.unwrap_or_else(Utc::now);
        imports::set_last_synced(&self.pool, &import.path, &import.media_type, when).await?;
        sources::set_last_synced(&self.pool, import.source_id(), when).await?;
        Ok(())
    }
}
