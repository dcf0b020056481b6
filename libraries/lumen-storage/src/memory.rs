//! In-memory import repository, used for tests and ephemeral setups

use async_trait::async_trait;
use chrono::Utc;
use lumen_core::{Import, ImportKey, ImportRepository, LumenError, MediaType, Result, Source};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Default)]
struct MemoryState {
    sources: HashMap<String, Source>,
    imports: BTreeMap<ImportKey, Import>,
}

/// Keeps sources and imports in process memory
///
/// Behaves like [`SqliteRepository`](crate::SqliteRepository): `active` is
/// not retained and removing a source removes its imports.
#[derive(Default)]
pub struct MemoryRepository {
    state: RwLock<MemoryState>,
}

impl MemoryRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for MemoryRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRepository").finish_non_exhaustive()
    }
}

fn stored(mut source: Source) -> Source {
    source.active = false;
    source
}

#[async_trait]
impl ImportRepository for MemoryRepository {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_sources(&self) -> Result<Vec<Source>> {
        let state = self.state.read().await;
        let mut sources: Vec<Source> = state.sources.values().cloned().collect();
        sources.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(sources)
    }

    async fn get_source(&self, identifier: &str) -> Result<Option<Source>> {
        Ok(self.state.read().await.sources.get(identifier).cloned())
    }

    async fn add_source(&self, source: &Source) -> Result<()> {
        let mut state = self.state.write().await;
        if state.sources.contains_key(&source.identifier) {
            return Err(LumenError::invalid_input(format!(
                "source {} already exists",
                source.identifier
            )));
        }
        state
            .sources
            .insert(source.identifier.clone(), stored(source.clone()));
        Ok(())
    }

    async fn update_source(&self, source: &Source) -> Result<()> {
        let mut state = self.state.write().await;
        let existing = state
            .sources
            .get_mut(&source.identifier)
            .ok_or_else(|| LumenError::not_found("source", source.identifier.clone()))?;
        existing.friendly_name.clone_from(&source.friendly_name);
        existing.icon_url.clone_from(&source.icon_url);
        existing
            .available_media_types
            .clone_from(&source.available_media_types);
        Ok(())
    }

    async fn remove_source(&self, identifier: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if state.sources.remove(identifier).is_none() {
            return Err(LumenError::not_found("source", identifier));
        }
        state
            .imports
            .retain(|_, import| import.source_id() != identifier);
        Ok(())
    }

    async fn get_imports(&self) -> Result<Vec<Import>> {
        let state = self.state.read().await;
        Ok(state
            .imports
            .values()
            .map(|import| with_stored_source(&state, import))
            .collect())
    }

    async fn get_import(&self, path: &str, media_type: &MediaType) -> Result<Option<Import>> {
        let state = self.state.read().await;
        Ok(state
            .imports
            .get(&ImportKey::new(path, media_type.clone()))
            .map(|import| with_stored_source(&state, import)))
    }

    async fn add_import(&self, import: &Import) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.sources.contains_key(import.source_id()) {
            return Err(LumenError::not_found("source", import.source_id()));
        }
        if state.imports.contains_key(&import.key()) {
            return Err(LumenError::invalid_input(format!(
                "import {} already exists",
                import.key()
            )));
        }
        state.imports.insert(import.key(), import.clone());
        Ok(())
    }

    async fn update_import(&self, import: &Import) -> Result<()> {
        let mut state = self.state.write().await;
        let existing = state
            .imports
            .get_mut(&import.key())
            .ok_or_else(|| LumenError::not_found("import", import.key().to_string()))?;
        existing.settings = import.settings.clone();
        Ok(())
    }

    async fn remove_import(&self, path: &str, media_type: &MediaType) -> Result<()> {
        let key = ImportKey::new(path, media_type.clone());
        match self.state.write().await.imports.remove(&key) {
            Some(_) => Ok(()),
            None => Err(LumenError::not_found("import", key.to_string())),
        }
    }

    async fn update_last_sync(&self, import: &Import) -> Result<()> {
        let when = import.last_synced.unwrap_or_else(Utc::now);
        let mut state = self.state.write().await;

        let existing = state
            .imports
            .get_mut(&import.key())
            .ok_or_else(|| LumenError::not_found("import", import.key().to_string()))?;
        existing.last_synced = Some(when);

        if let Some(source) = state.sources.get_mut(import.source_id()) {
            source.last_synced = Some(when);
        }
        Ok(())
    }
}

/// The import with its source snapshot replaced by the stored source
fn with_stored_source(state: &MemoryState, import: &Import) -> Import {
    let mut import = import.clone();
    if let Some(source) = state.sources.get(import.source_id()) {
        import.set_source(source.clone());
    }
    import
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::media_types;

    fn source() -> Source {
        Source::new("/srv/media", "Media").with_active(true)
    }

    #[tokio::test]
    async fn test_active_flag_is_not_kept() {
        let repository = MemoryRepository::new();
        repository.add_source(&source()).await.unwrap();

        let stored = repository.get_source("/srv/media").await.unwrap().unwrap();
        assert!(!stored.active);
    }

    #[tokio::test]
    async fn test_remove_source_cascades() {
        let repository = MemoryRepository::new();
        repository.add_source(&source()).await.unwrap();
        repository
            .add_import(&Import::new("/srv/media", media_types::MOVIE, source()))
            .await
            .unwrap();

        repository.remove_source("/srv/media").await.unwrap();
        assert!(repository.get_imports().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_requires_source() {
        let repository = MemoryRepository::new();
        let result = repository
            .add_import(&Import::new("/srv/media", media_types::MOVIE, source()))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_last_sync_stamps_source() {
        let repository = MemoryRepository::new();
        repository.add_source(&source()).await.unwrap();
        let mut import = Import::new("/srv/media", media_types::MOVIE, source());
        repository.add_import(&import).await.unwrap();

        import.last_synced = Some(Utc::now());
        repository.update_last_sync(&import).await.unwrap();

        let stored = repository.get_source("/srv/media").await.unwrap().unwrap();
        assert_eq!(stored.last_synced, import.last_synced);
        let stored = repository
            .get_import("/srv/media", &MediaType::new(media_types::MOVIE))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.last_synced, import.last_synced);
        assert!(!stored.active);
    }
}
