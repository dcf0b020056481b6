//! Imported items storage
//!
//! Rows of the local library written by the bundled library handler. The
//! row id is exposed as the item's `library_id`.

use crate::codec::{format_time, parse_time};
use crate::StorageError;
use lumen_core::{MediaItem, MediaType, PlaybackInfo};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

type Result<T> = std::result::Result<T, StorageError>;

const SELECT_ITEMS: &str = r#"
    SELECT id, identifier, media_type, import_path, title, year, parent, metadata,
           play_count, last_played, resume_position_ms, enabled
    FROM imported_items
"#;

/// Get the items of one import
pub async fn get_by_import(
    pool: &SqlitePool,
    import_path: &str,
    media_type: &MediaType,
) -> Result<Vec<MediaItem>> {
    let rows = sqlx::query(&format!(
        "{SELECT_ITEMS} WHERE import_path = ? AND media_type = ? ORDER BY id"
    ))
    .bind(import_path)
    .bind(media_type.as_str())
    .fetch_all(pool)
    .await?;

    rows.iter().map(item_from_row).collect()
}

/// Get all items of one media type across imports
pub async fn get_by_media_type(pool: &SqlitePool, media_type: &MediaType) -> Result<Vec<MediaItem>> {
    let rows = sqlx::query(&format!("{SELECT_ITEMS} WHERE media_type = ? ORDER BY id"))
        .bind(media_type.as_str())
        .fetch_all(pool)
        .await?;

    rows.iter().map(item_from_row).collect()
}

/// Insert an item, returning its row id
pub async fn insert(pool: &SqlitePool, import_path: &str, item: &MediaItem) -> Result<i64> {
    let metadata = serde_json::to_string(&item.metadata)?;

    let result = sqlx::query(
        r#"
        INSERT INTO imported_items
            (identifier, media_type, import_path, title, year, parent, metadata,
             play_count, last_played, resume_position_ms, enabled)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&item.identifier)
    .bind(item.media_type.as_str())
    .bind(import_path)
    .bind(&item.title)
    .bind(item.year)
    .bind(&item.parent)
    .bind(metadata)
    .bind(i64::from(item.playback.play_count))
    .bind(item.playback.last_played.map(format_time))
    .bind(item.playback.resume_position_ms.map(position_to_db))
    .bind(item.enabled)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Overwrite a stored item
pub async fn update(pool: &SqlitePool, id: i64, item: &MediaItem) -> Result<()> {
    let metadata = serde_json::to_string(&item.metadata)?;

    let result = sqlx::query(
        r#"
        UPDATE imported_items
        SET identifier = ?, title = ?, year = ?, parent = ?, metadata = ?,
            play_count = ?, last_played = ?, resume_position_ms = ?, enabled = ?
        WHERE id = ?
        "#,
    )
    .bind(&item.identifier)
    .bind(&item.title)
    .bind(item.year)
    .bind(&item.parent)
    .bind(metadata)
    .bind(i64::from(item.playback.play_count))
    .bind(item.playback.last_played.map(format_time))
    .bind(item.playback.resume_position_ms.map(position_to_db))
    .bind(item.enabled)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("item", id.to_string()));
    }
    Ok(())
}

/// Delete one item
pub async fn delete(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM imported_items WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete every item of an import, returning the number removed
pub async fn delete_by_import(pool: &SqlitePool, import_path: &str, media_type: &MediaType) -> Result<u64> {
    let result = sqlx::query("DELETE FROM imported_items WHERE import_path = ? AND media_type = ?")
        .bind(import_path)
        .bind(media_type.as_str())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Enable or disable every item of an import
pub async fn set_enabled(
    pool: &SqlitePool,
    import_path: &str,
    media_type: &MediaType,
    enabled: bool,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE imported_items SET enabled = ? WHERE import_path = ? AND media_type = ?",
    )
    .bind(enabled)
    .bind(import_path)
    .bind(media_type.as_str())
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Delete items of `media_type` below `import_path` that no item of
/// `child_type` refers to as its parent. Returns the number removed.
pub async fn delete_childless(
    pool: &SqlitePool,
    import_path: &str,
    media_type: &MediaType,
    child_type: &MediaType,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM imported_items
        WHERE import_path = ?1 AND media_type = ?2
          AND NOT EXISTS (
              SELECT 1 FROM imported_items child
              WHERE child.import_path = ?1
                AND child.media_type = ?3
                AND child.parent = imported_items.identifier
          )
        "#,
    )
    .bind(import_path)
    .bind(media_type.as_str())
    .bind(child_type.as_str())
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

fn position_to_db(position_ms: u64) -> i64 {
    i64::try_from(position_ms).unwrap_or(i64::MAX)
}

fn item_from_row(row: &SqliteRow) -> Result<MediaItem> {
    let id: i64 = row.try_get("id")?;
    let metadata: String = row.try_get("metadata")?;
    let play_count: i64 = row.try_get("play_count")?;
    let resume_position: Option<i64> = row.try_get("resume_position_ms")?;

    Ok(MediaItem {
        identifier: row.try_get("identifier")?,
        media_type: MediaType::new(row.try_get::<String, _>("media_type")?),
        title: row.try_get("title")?,
        year: row.try_get("year")?,
        parent: row.try_get("parent")?,
        metadata: serde_json::from_str(&metadata)?,
        playback: PlaybackInfo {
            play_count: u32::try_from(play_count).unwrap_or_default(),
            last_played: parse_time(row.try_get("last_played")?)?,
            resume_position_ms: resume_position.and_then(|p| u64::try_from(p).ok()),
        },
        library_id: Some(id.to_string()),
        import_path: Some(row.try_get("import_path")?),
        enabled: row.try_get("enabled")?,
    })
}
