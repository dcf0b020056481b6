//! Library handler backed by the `imported_items` table

use async_trait::async_trait;
use lumen_core::{media_types, Import, LumenError, MediaItem, MediaType, MediaTypeHandler, Result};
use lumen_storage::items;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

const SHOW_GROUP: [&str; 3] = [media_types::TVSHOW, media_types::SEASON, media_types::EPISODE];

/// Stores items of one media type in the local library
#[derive(Debug, Clone)]
pub struct LibraryHandler {
    media_type: MediaType,
    pool: SqlitePool,
}

impl LibraryHandler {
    pub fn new(media_type: &str, pool: SqlitePool) -> Self {
        Self {
            media_type: MediaType::new(media_type),
            pool,
        }
    }

    /// Handlers for movies and the show hierarchy
    pub fn all(pool: &SqlitePool) -> Vec<Arc<dyn MediaTypeHandler>> {
        [
            media_types::MOVIE,
            media_types::TVSHOW,
            media_types::SEASON,
            media_types::EPISODE,
        ]
        .into_iter()
        .map(|media_type| Arc::new(Self::new(media_type, pool.clone())) as Arc<dyn MediaTypeHandler>)
        .collect()
    }

    fn is_show_type(&self) -> bool {
        SHOW_GROUP.contains(&self.media_type.as_str())
    }
}

fn library_id(item: &MediaItem) -> Result<i64> {
    item.library_id
        .as_deref()
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| {
            LumenError::invalid_input(format!("{} has no library id", item.identifier))
        })
}

#[async_trait]
impl MediaTypeHandler for LibraryHandler {
    fn media_type(&self) -> MediaType {
        self.media_type.clone()
    }

    fn dependencies(&self) -> BTreeSet<MediaType> {
        match self.media_type.as_str() {
            media_types::SEASON => BTreeSet::from([MediaType::new(media_types::TVSHOW)]),
            media_types::EPISODE => BTreeSet::from([MediaType::new(media_types::SEASON)]),
            _ => BTreeSet::new(),
        }
    }

    fn required_media_types(&self) -> BTreeSet<MediaType> {
        match self.media_type.as_str() {
            media_types::SEASON => BTreeSet::from([MediaType::new(media_types::TVSHOW)]),
            media_types::EPISODE => BTreeSet::from([
                MediaType::new(media_types::TVSHOW),
                MediaType::new(media_types::SEASON),
            ]),
            _ => BTreeSet::new(),
        }
    }

    fn grouped_media_types(&self) -> Vec<MediaType> {
        if self.is_show_type() {
            SHOW_GROUP.iter().map(|m| MediaType::new(*m)).collect()
        } else {
            Vec::new()
        }
    }

    async fn get_local_items(&self, import: &Import) -> Result<Vec<MediaItem>> {
        Ok(items::get_by_import(&self.pool, &import.path, &self.media_type).await?)
    }

    /// Shows are matched on title and year first, since folder renames
    /// change their identifier
    fn find_match(&self, item: &MediaItem, local_items: &[MediaItem]) -> Option<usize> {
        let by_identifier = local_items
            .iter()
            .position(|local| local.identifier == item.identifier);

        if self.media_type != media_types::TVSHOW {
            return by_identifier;
        }

        local_items
            .iter()
            .position(|local| local.title == item.title && local.year == item.year)
            .or(by_identifier)
    }

    async fn add_imported_item(&self, import: &Import, item: &MediaItem) -> Result<()> {
        let id = items::insert(&self.pool, &import.path, item).await?;
        debug!("Added {} {} as #{}", self.media_type, item.identifier, id);
        Ok(())
    }

    async fn update_imported_item(&self, _import: &Import, item: &MediaItem) -> Result<()> {
        items::update(&self.pool, library_id(item)?, item).await?;
        debug!("Updated {} {}", self.media_type, item.identifier);
        Ok(())
    }

    async fn remove_imported_item(&self, _import: &Import, item: &MediaItem) -> Result<()> {
        items::delete(&self.pool, library_id(item)?).await?;
        debug!("Removed {} {}", self.media_type, item.identifier);
        Ok(())
    }

    async fn remove_imported_items(&self, import: &Import) -> Result<()> {
        let removed = items::delete_by_import(&self.pool, &import.path, &self.media_type).await?;
        info!("Removed {} items of {}", removed, import.key());
        Ok(())
    }

    /// After episodes are synchronized, drop seasons without episodes and
    /// shows without seasons
    async fn cleanup_imported_items(&self, import: &Import) -> Result<()> {
        if self.media_type != media_types::EPISODE {
            return Ok(());
        }

        let seasons = items::delete_childless(
            &self.pool,
            &import.path,
            &MediaType::new(media_types::SEASON),
            &MediaType::new(media_types::EPISODE),
        )
        .await?;
        let shows = items::delete_childless(
            &self.pool,
            &import.path,
            &MediaType::new(media_types::TVSHOW),
            &MediaType::new(media_types::SEASON),
        )
        .await?;

        if seasons + shows > 0 {
            info!(
                "Cleaned up {} empty seasons and {} empty shows below {}",
                seasons, shows, import.path
            );
        }
        Ok(())
    }

    async fn set_imported_items_enabled(&self, import: &Import, enabled: bool) -> Result<()> {
        let changed = items::set_enabled(&self.pool, &import.path, &self.media_type, enabled).await?;
        debug!(
            "{} {} items of {}",
            if enabled { "Enabled" } else { "Disabled" },
            changed,
            import.key()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler(media_type: &str) -> LibraryHandler {
        let pool = SqlitePool::connect_lazy("sqlite::memory:").unwrap();
        LibraryHandler::new(media_type, pool)
    }

    #[tokio::test]
    async fn test_show_hierarchy_relations() {
        let episode = handler(media_types::EPISODE);
        assert_eq!(
            episode.dependencies(),
            BTreeSet::from([MediaType::new(media_types::SEASON)])
        );
        assert_eq!(episode.required_media_types().len(), 2);
        assert_eq!(episode.grouped_media_types().len(), 3);

        let movie = handler(media_types::MOVIE);
        assert!(movie.dependencies().is_empty());
        assert!(movie.grouped_media_types().is_empty());
    }

    #[tokio::test]
    async fn test_renamed_show_matches_on_title_and_year() {
        let shows = handler(media_types::TVSHOW);
        let local = vec![
            MediaItem::new("/media/Firefly", media_types::TVSHOW, "Firefly"),
            MediaItem::new("/media/Firefly (2002)", media_types::TVSHOW, "Firefly").with_year(2002),
        ];

        let renamed = MediaItem::new("/media/TV/Firefly (2002)", media_types::TVSHOW, "Firefly")
            .with_year(2002);
        assert_eq!(shows.find_match(&renamed, &local), Some(1));

        let unknown = MediaItem::new("/media/Dollhouse", media_types::TVSHOW, "Dollhouse");
        assert_eq!(shows.find_match(&unknown, &local), None);
    }

    #[tokio::test]
    async fn test_movies_match_on_identifier_only() {
        let movies = handler(media_types::MOVIE);
        let local = vec![MediaItem::new("/media/a.mkv", media_types::MOVIE, "Alien")];

        let same_title = MediaItem::new("/media/b.mkv", media_types::MOVIE, "Alien");
        assert_eq!(movies.find_match(&same_title, &local), None);
    }

    #[test]
    fn test_library_id_must_be_numeric() {
        let mut item = MediaItem::new("a", media_types::MOVIE, "Alien");
        assert!(library_id(&item).is_err());
        item.library_id = Some("12".to_string());
        assert_eq!(library_id(&item).unwrap(), 12);
    }
}
