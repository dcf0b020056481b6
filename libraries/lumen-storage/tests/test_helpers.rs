//! Test helpers and fixtures for storage integration tests
//!
//! These helpers create test databases using real `SQLite` files (not
//! in-memory) so every pooled connection sees the same schema and data.

#![allow(dead_code)]

use lumen_core::{media_types, Import, MediaType, Source};
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Test database wrapper that cleans up on drop
pub struct TestDb {
    pub pool: SqlitePool,
    _temp_dir: TempDir,
}

impl TestDb {
    /// Create a new test database with migrations applied
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        let db_url = format!("sqlite://{}", db_path.display());

        let pool = lumen_storage::create_pool(&db_url)
            .await
            .expect("Failed to create pool");

        lumen_storage::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        Self {
            pool,
            _temp_dir: temp_dir,
        }
    }

    /// Get the pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Test fixture: a source offering movies and shows
pub fn test_source(identifier: &str) -> Source {
    Source::new(identifier, "Test share")
        .with_icon("http://nas/icon.png")
        .with_media_types([
            MediaType::new(media_types::MOVIE),
            MediaType::new(media_types::TVSHOW),
        ])
        .with_active(true)
}

/// Test fixture: a movie import of `source`
pub fn test_import(source: &Source, path: &str) -> Import {
    Import::new(path, media_types::MOVIE, source.clone())
}
