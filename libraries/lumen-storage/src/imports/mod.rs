//! Imports storage
//!
//! Each import row references its source; the source record itself is
//! joined in when imports are loaded.

use crate::codec::{format_time, parse_time};
use crate::sources::source_from_row;
use crate::StorageError;
use chrono::{DateTime, Utc};
use lumen_core::{Import, ImportSettings, MediaType};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

type Result<T> = std::result::Result<T, StorageError>;

const SELECT_IMPORTS: &str = r#"
    SELECT i.path, i.media_type, i.settings, i.last_synced AS import_last_synced,
           s.identifier, s.friendly_name, s.icon_url, s.media_types, s.last_synced
    FROM imports i
    JOIN import_sources s ON s.identifier = i.source_identifier
"#;

/// Get all imports ordered by path and media type
pub async fn get_all(pool: &SqlitePool) -> Result<Vec<Import>> {
    let rows = sqlx::query(&format!("{SELECT_IMPORTS} ORDER BY i.path, i.media_type"))
        .fetch_all(pool)
        .await?;

    rows.iter().map(import_from_row).collect()
}

/// Get the imports of one source
pub async fn get_by_source(pool: &SqlitePool, source_identifier: &str) -> Result<Vec<Import>> {
    let rows = sqlx::query(&format!(
        "{SELECT_IMPORTS} WHERE i.source_identifier = ? ORDER BY i.path, i.media_type"
    ))
    .bind(source_identifier)
    .fetch_all(pool)
    .await?;

    rows.iter().map(import_from_row).collect()
}

/// Get an import by key
pub async fn get(pool: &SqlitePool, path: &str, media_type: &MediaType) -> Result<Option<Import>> {
    let row = sqlx::query(&format!(
        "{SELECT_IMPORTS} WHERE i.path = ? AND i.media_type = ?"
    ))
    .bind(path)
    .bind(media_type.as_str())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(import_from_row).transpose()
}

/// Insert a new import
///
/// # Errors
/// Returns `AlreadyExists` for a duplicate key, or a database error when
/// the source is not stored
pub async fn insert(pool: &SqlitePool, import: &Import) -> Result<()> {
    let settings = import.settings.to_document().map_err(|e| StorageError::SerializationError(e.to_string()))?;

    let result = sqlx::query(
        r#"
        INSERT INTO imports (path, media_type, source_identifier, settings, last_synced)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(path, media_type) DO NOTHING
        "#,
    )
    .bind(&import.path)
    .bind(import.media_type.as_str())
    .bind(import.source_id())
    .bind(settings)
    .bind(import.last_synced.map(format_time))
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::already_exists("import", import.key().to_string()));
    }
    Ok(())
}

/// Replace the settings of an import
pub async fn update_settings(
    pool: &SqlitePool,
    path: &str,
    media_type: &MediaType,
    settings: &ImportSettings,
) -> Result<()> {
    let settings = settings.to_document().map_err(|e| StorageError::SerializationError(e.to_string()))?;

    let result = sqlx::query("UPDATE imports SET settings = ? WHERE path = ? AND media_type = ?")
        .bind(settings)
        .bind(path)
        .bind(media_type.as_str())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("import", format!("{path} [{media_type}]")));
    }
    Ok(())
}

/// Record the time of the last completed synchronization
pub async fn set_last_synced(
    pool: &SqlitePool,
    path: &str,
    media_type: &MediaType,
    when: DateTime<Utc>,
) -> Result<()> {
    let result = sqlx::query("UPDATE imports SET last_synced = ? WHERE path = ? AND media_type = ?")
        .bind(format_time(when))
        .bind(path)
        .bind(media_type.as_str())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("import", format!("{path} [{media_type}]")));
    }
    Ok(())
}

/// Delete an import
pub async fn delete(pool: &SqlitePool, path: &str, media_type: &MediaType) -> Result<()> {
    let result = sqlx::query("DELETE FROM imports WHERE path = ? AND media_type = ?")
        .bind(path)
        .bind(media_type.as_str())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("import", format!("{path} [{media_type}]")));
    }
    Ok(())
}

fn import_from_row(row: &SqliteRow) -> Result<Import> {
    let source = source_from_row(row)?;
    let media_type: String = row.try_get("media_type")?;
    let settings: String = row.try_get("settings")?;
    let settings = ImportSettings::from_document(&settings)
        .map_err(|e| StorageError::SerializationError(e.to_string()))?;

    let mut import = Import::new(row.try_get::<String, _>("path")?, media_type, source)
        .with_settings(settings);
    import.last_synced = parse_time(row.try_get("import_last_synced")?)?;
    Ok(import)
}
