//! Import sources storage
//!
//! Sources are stored by identifier. The runtime `active` flag is not
//! persisted; loaded sources are always inactive.
//!
//! # Example
//!
//! ```rust,no_run
//! use lumen_core::{media_types, MediaType, Source};
//! use lumen_storage::sources;
//!
//! # async fn example(pool: &sqlx::SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
//! let source = Source::new("/srv/media", "Media share")
//!     .with_media_types([MediaType::new(media_types::MOVIE)]);
//! sources::insert(pool, &source).await?;
//!
//! let all = sources::get_all(pool).await?;
//! # Ok(())
//! # }
//! ```

use crate::codec::{format_time, parse_time};
use crate::StorageError;
use chrono::{DateTime, Utc};
use lumen_core::{MediaType, Source};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;

type Result<T> = std::result::Result<T, StorageError>;

/// Get all sources ordered by identifier
pub async fn get_all(pool: &SqlitePool) -> Result<Vec<Source>> {
    let rows = sqlx::query(
        r#"
        SELECT identifier, friendly_name, icon_url, media_types, last_synced
        FROM import_sources
        ORDER BY identifier
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(source_from_row).collect()
}

/// Get a source by identifier
pub async fn get_by_identifier(pool: &SqlitePool, identifier: &str) -> Result<Option<Source>> {
    let row = sqlx::query(
        r#"
        SELECT identifier, friendly_name, icon_url, media_types, last_synced
        FROM import_sources
        WHERE identifier = ?
        "#,
    )
    .bind(identifier)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(source_from_row).transpose()
}

/// Insert a new source
///
/// # Errors
/// Returns `AlreadyExists` if a source with the same identifier is stored
pub async fn insert(pool: &SqlitePool, source: &Source) -> Result<()> {
    let media_types = serde_json::to_string(&source.available_media_types)?;

    let result = sqlx::query(
        r#"
        INSERT INTO import_sources (identifier, friendly_name, icon_url, media_types, last_synced)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(identifier) DO NOTHING
        "#,
    )
    .bind(&source.identifier)
    .bind(&source.friendly_name)
    .bind(&source.icon_url)
    .bind(media_types)
    .bind(source.last_synced.map(format_time))
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::already_exists("source", &source.identifier));
    }
    Ok(())
}

/// Update friendly name, icon and media types of a source
pub async fn update(pool: &SqlitePool, source: &Source) -> Result<()> {
    let media_types = serde_json::to_string(&source.available_media_types)?;

    let result = sqlx::query(
        r#"
        UPDATE import_sources
        SET friendly_name = ?, icon_url = ?, media_types = ?
        WHERE identifier = ?
        "#,
    )
    .bind(&source.friendly_name)
    .bind(&source.icon_url)
    .bind(media_types)
    .bind(&source.identifier)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("source", &source.identifier));
    }
    Ok(())
}

/// Record the time of the last completed synchronization
pub async fn set_last_synced(pool: &SqlitePool, identifier: &str, when: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE import_sources SET last_synced = ? WHERE identifier = ?")
        .bind(format_time(when))
        .bind(identifier)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete a source; its imports are removed by the foreign key cascade
pub async fn delete(pool: &SqlitePool, identifier: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM import_sources WHERE identifier = ?")
        .bind(identifier)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("source", identifier));
    }
    Ok(())
}

pub(crate) fn source_from_row(row: &SqliteRow) -> Result<Source> {
    let media_types: String = row.try_get("media_types")?;
    let media_types: BTreeSet<MediaType> = serde_json::from_str(&media_types)?;

    Ok(Source {
        identifier: row.try_get("identifier")?,
        friendly_name: row.try_get("friendly_name")?,
        icon_url: row.try_get("icon_url")?,
        available_media_types: media_types,
        last_synced: parse_time(row.try_get("last_synced")?)?,
        active: false,
    })
}
