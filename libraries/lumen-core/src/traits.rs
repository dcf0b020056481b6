/// Plugin contracts consumed by the synchronization engine
use crate::context::RetrievalContext;
use crate::error::{LumenError, Result};
use crate::types::{Import, MediaItem, MediaType, Source};
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Importer factory
///
/// One factory is registered per protocol (network share, UPnP, folder, ...).
/// The engine asks factories via `can_import` and creates a fresh
/// `Importer` for every retrieval.
#[async_trait]
pub trait ImporterFactory: Send + Sync {
    /// Protocol identifier (e.g. "smb", "upnp", "folder")
    fn protocol(&self) -> &str;

    /// Whether this factory can import from the given path
    async fn can_import(&self, path: &str) -> bool;

    /// Create an importer instance for one import
    ///
    /// # Errors
    /// Returns an error if the import cannot be served by this protocol
    fn create(&self, import: &Import) -> Result<Box<dyn Importer>>;

    /// Whether item metadata can be written back to the source
    fn can_update_metadata_on_source(&self, _path: &str) -> bool {
        false
    }

    /// Whether play counts can be written back to the source
    fn can_update_playcount_on_source(&self, _path: &str) -> bool {
        false
    }

    /// Whether last played timestamps can be written back to the source
    fn can_update_last_played_on_source(&self, _path: &str) -> bool {
        false
    }

    /// Whether resume positions can be written back to the source
    fn can_update_resume_position_on_source(&self, _path: &str) -> bool {
        false
    }
}

/// Importer instance bound to one import
#[async_trait]
pub trait Importer: Send {
    /// Retrieve the current items of the import, pushing them into `ctx`
    ///
    /// # Errors
    /// Returns an error if the source cannot be reached or parsed
    async fn import(&mut self, ctx: &mut RetrievalContext<'_>) -> Result<()>;

    /// Push a local change of `item` back to the source
    ///
    /// # Errors
    /// Returns an error if the source rejects the update
    async fn update_on_source(&mut self, item: &MediaItem) -> Result<()> {
        Err(LumenError::unsupported(format!(
            "updating {} on source",
            item.identifier
        )))
    }
}

/// Media type handler
///
/// Persists the items of one media type into the local library. Relations
/// between media types are declared here and drive synchronization order.
#[async_trait]
pub trait MediaTypeHandler: Send + Sync {
    /// The handled media type
    fn media_type(&self) -> MediaType;

    /// Media types that must be synchronized before this one
    fn dependencies(&self) -> BTreeSet<MediaType> {
        BTreeSet::new()
    }

    /// Media types that must have a handler for this handler to be usable
    fn required_media_types(&self) -> BTreeSet<MediaType> {
        BTreeSet::new()
    }

    /// Media types imported together with this one (including itself)
    fn grouped_media_types(&self) -> Vec<MediaType> {
        Vec::new()
    }

    /// Load the items currently stored for `import`
    ///
    /// # Errors
    /// Returns an error if the local store cannot be read
    async fn get_local_items(&self, import: &Import) -> Result<Vec<MediaItem>>;

    /// Find the local item matching a retrieved one.
    ///
    /// The default matches on identifier equality; the first match wins.
    fn find_match(&self, item: &MediaItem, local_items: &[MediaItem]) -> Option<usize> {
        local_items
            .iter()
            .position(|local| local.identifier == item.identifier)
    }

    /// Whether a retrieved item differs from its local counterpart
    fn has_changes(&self, local: &MediaItem, retrieved: &MediaItem, include_playback: bool) -> bool {
        retrieved.differs_from(local, include_playback)
    }

    /// Add a newly imported item
    ///
    /// # Errors
    /// Returns an error if the item cannot be stored
    async fn add_imported_item(&self, import: &Import, item: &MediaItem) -> Result<()>;

    /// Update an already imported item
    ///
    /// # Errors
    /// Returns an error if the item cannot be stored
    async fn update_imported_item(&self, import: &Import, item: &MediaItem) -> Result<()>;

    /// Remove an imported item
    ///
    /// # Errors
    /// Returns an error if the item cannot be removed
    async fn remove_imported_item(&self, import: &Import, item: &MediaItem) -> Result<()>;

    /// Remove every item of `import`
    ///
    /// # Errors
    /// Returns an error on the first item that cannot be removed
    async fn remove_imported_items(&self, import: &Import) -> Result<()> {
        for item in self.get_local_items(import).await? {
            self.remove_imported_item(import, &item).await?;
        }
        Ok(())
    }

    /// Remove local items that lost all connection to any import
    ///
    /// # Errors
    /// Returns an error if the local store cannot be cleaned
    async fn cleanup_imported_items(&self, _import: &Import) -> Result<()> {
        Ok(())
    }

    /// Enable or disable every item of `import`
    ///
    /// # Errors
    /// Returns an error if the local store cannot be updated
    async fn set_imported_items_enabled(&self, import: &Import, enabled: bool) -> Result<()>;
}

/// Persistence backend for sources and imports
#[async_trait]
pub trait ImportRepository: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Get all sources
    async fn get_sources(&self) -> Result<Vec<Source>>;

    /// Get a source by identifier
    async fn get_source(&self, identifier: &str) -> Result<Option<Source>>;

    /// Add a source
    async fn add_source(&self, source: &Source) -> Result<()>;

    /// Update name, icon and media types of a source
    async fn update_source(&self, source: &Source) -> Result<()>;

    /// Remove a source and all of its imports
    async fn remove_source(&self, identifier: &str) -> Result<()>;

    /// Get all imports
    async fn get_imports(&self) -> Result<Vec<Import>>;

    /// Get an import by key
    async fn get_import(&self, path: &str, media_type: &MediaType) -> Result<Option<Import>>;

    /// Add an import
    async fn add_import(&self, import: &Import) -> Result<()>;

    /// Update the settings of an import
    async fn update_import(&self, import: &Import) -> Result<()>;

    /// Remove an import
    async fn remove_import(&self, path: &str, media_type: &MediaType) -> Result<()>;

    /// Record a completed synchronization for an import and its source
    async fn update_last_sync(&self, import: &Import) -> Result<()>;
}
