//! Source and import registry
//!
//! In-memory cache of known sources and imports, backed by one or more
//! repositories. Writes fan out to every repository and count as successful
//! when at least one repository accepts them. The cache lock is only held
//! while touching the maps, never across repository I/O; keys being added
//! are reserved first so concurrent adds of the same key cannot both write.

use crate::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use lumen_core::{Import, ImportKey, ImportRepository, MediaType, Source};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, warn};

#[derive(Default)]
struct RegistryState {
    sources: HashMap<String, Source>,
    imports: HashMap<ImportKey, Import>,
    /// Keys whose repository writes are in flight
    adding_sources: HashSet<String>,
    adding_imports: HashSet<ImportKey>,
}

/// Cache of sources and imports with repository fan-out
pub struct SourceRegistry {
    repositories: Vec<Arc<dyn ImportRepository>>,
    state: RwLock<RegistryState>,
    loaded: OnceCell<()>,
}

impl SourceRegistry {
    /// Create a registry over the given repositories
    pub fn new(repositories: Vec<Arc<dyn ImportRepository>>) -> Self {
        Self {
            repositories,
            state: RwLock::new(RegistryState::default()),
            loaded: OnceCell::new(),
        }
    }

    /// Populate the cache from the repositories on first use
    async fn ensure_loaded(&self) {
        self.loaded
            .get_or_init(|| async {
                let mut sources = Vec::new();
                let mut imports = Vec::new();

                for repository in &self.repositories {
                    match repository.get_sources().await {
                        Ok(found) => sources.extend(found),
                        Err(e) => warn!("Failed to load sources from {}: {}", repository.name(), e),
                    }
                    match repository.get_imports().await {
                        Ok(found) => imports.extend(found),
                        Err(e) => warn!("Failed to load imports from {}: {}", repository.name(), e),
                    }
                }

                let mut state = self.state.write().await;
                for mut source in sources {
                    // Sources stay inactive until they are discovered again
                    source.active = false;
                    state.sources.entry(source.identifier.clone()).or_insert(source);
                }
                for mut import in imports {
                    let Some(source) = state.sources.get(import.source_id()).cloned() else {
                        warn!("Skipping import {} of unknown source", import.key());
                        continue;
                    };
                    import.set_source(source);
                    state.imports.entry(import.key()).or_insert(import);
                }

                debug!(
                    "Loaded {} sources and {} imports",
                    state.sources.len(),
                    state.imports.len()
                );
            })
            .await;
    }

    /// Run `op` against every repository; true if at least one succeeded
    async fn fan_out<'a, F, Fut>(&'a self, what: &str, op: F) -> bool
    where
        F: Fn(&'a Arc<dyn ImportRepository>) -> Fut,
        Fut: Future<Output = lumen_core::Result<()>> + 'a,
    {
        let mut accepted = false;
        for repository in &self.repositories {
            match op(repository).await {
                Ok(()) => accepted = true,
                Err(e) => warn!("{} failed in {}: {}", what, repository.name(), e),
            }
        }
        accepted
    }

    // Sources

    /// All sources, optionally filtered by their active state
    pub async fn get_sources(&self, active: Option<bool>) -> Vec<Source> {
        self.ensure_loaded().await;
        let state = self.state.read().await;
        let mut sources: Vec<Source> = state
            .sources
            .values()
            .filter(|s| active.map_or(true, |a| s.active == a))
            .cloned()
            .collect();
        sources.sort_by(|a, b| a.friendly_name.cmp(&b.friendly_name));
        sources
    }

    /// A source by identifier
    pub async fn get_source(&self, identifier: &str) -> Option<Source> {
        self.ensure_loaded().await;
        self.state.read().await.sources.get(identifier).cloned()
    }

    /// Whether a source is known
    pub async fn has_source(&self, identifier: &str) -> bool {
        self.get_source(identifier).await.is_some()
    }

    /// Persist and cache a new source
    ///
    /// Adding a source that is already known, or being added by another
    /// caller, does nothing.
    pub async fn add_source(&self, source: &Source) -> Result<()> {
        self.ensure_loaded().await;
        {
            let mut state = self.state.write().await;
            if state.sources.contains_key(&source.identifier)
                || !state.adding_sources.insert(source.identifier.clone())
            {
                return Ok(());
            }
        }

        let accepted = self.fan_out("add_source", |r| r.add_source(source)).await;

        let mut state = self.state.write().await;
        state.adding_sources.remove(&source.identifier);
        if !accepted {
            return Err(SyncError::Persistence(format!(
                "no repository accepted source {}",
                source.identifier
            )));
        }
        state
            .sources
            .insert(source.identifier.clone(), source.clone());
        Ok(())
    }

    /// Persist name, icon and media types of a source and refresh the cache
    pub async fn update_source(&self, source: &Source) -> Result<()> {
        self.ensure_loaded().await;
        if !self.has_source(&source.identifier).await {
            return Err(SyncError::UnknownSource(source.identifier.clone()));
        }

        if !self.fan_out("update_source", |r| r.update_source(source)).await {
            return Err(SyncError::Persistence(format!(
                "no repository accepted update of source {}",
                source.identifier
            )));
        }

        self.cache_source(source.clone()).await;
        Ok(())
    }

    /// Change the runtime active state of a source and its imports.
    ///
    /// Returns the updated source, or `None` if the state did not change.
    pub async fn set_source_active(&self, identifier: &str, active: bool) -> Result<Option<Source>> {
        self.ensure_loaded().await;
        let mut state = self.state.write().await;
        let source = state
            .sources
            .get_mut(identifier)
            .ok_or_else(|| SyncError::UnknownSource(identifier.to_string()))?;

        if source.active == active {
            return Ok(None);
        }
        source.active = active;
        let source = source.clone();

        for import in state.imports.values_mut() {
            if import.source_id() == identifier {
                import.set_source(source.clone());
            }
        }

        Ok(Some(source))
    }

    /// Remove a source and its imports from every repository and the cache
    pub async fn remove_source(&self, identifier: &str) -> Result<()> {
        self.ensure_loaded().await;
        if !self.has_source(identifier).await {
            return Err(SyncError::UnknownSource(identifier.to_string()));
        }

        if !self.fan_out("remove_source", |r| r.remove_source(identifier)).await {
            return Err(SyncError::Persistence(format!(
                "no repository removed source {identifier}"
            )));
        }

        let mut state = self.state.write().await;
        state.sources.remove(identifier);
        state.imports.retain(|_, import| import.source_id() != identifier);
        Ok(())
    }

    /// Replace the cached source and refresh the snapshots held by its imports
    async fn cache_source(&self, source: Source) {
        let mut state = self.state.write().await;
        for import in state.imports.values_mut() {
            if import.source_id() == source.identifier {
                import.set_source(source.clone());
            }
        }
        state.sources.insert(source.identifier.clone(), source);
    }

    // Imports

    /// All imports, sorted by path then media type
    pub async fn get_imports(&self) -> Vec<Import> {
        self.ensure_loaded().await;
        let mut imports: Vec<Import> = self.state.read().await.imports.values().cloned().collect();
        imports.sort_by(|a, b| a.key().cmp(&b.key()));
        imports
    }

    /// Imports of one source
    pub async fn get_imports_by_source(&self, source_id: &str) -> Vec<Import> {
        let mut imports = self.get_imports().await;
        imports.retain(|i| i.source_id() == source_id);
        imports
    }

    /// Imports of one media type
    pub async fn get_imports_by_media_type(&self, media_type: &MediaType) -> Vec<Import> {
        let mut imports = self.get_imports().await;
        imports.retain(|i| &i.media_type == media_type);
        imports
    }

    /// Imports below one path
    pub async fn get_imports_by_path(&self, path: &str) -> Vec<Import> {
        let mut imports = self.get_imports().await;
        imports.retain(|i| i.path == path);
        imports
    }

    /// An import by key
    pub async fn get_import(&self, path: &str, media_type: &MediaType) -> Option<Import> {
        self.ensure_loaded().await;
        self.state
            .read()
            .await
            .imports
            .get(&ImportKey::new(path, media_type.clone()))
            .cloned()
    }

    /// Persist and cache a new import.
    ///
    /// Returns false when an identical import already exists or is being
    /// added by another caller.
    pub async fn add_import(&self, import: &Import) -> Result<bool> {
        self.ensure_loaded().await;
        let key = import.key();
        {
            let mut state = self.state.write().await;
            if state.imports.contains_key(&key) || !state.adding_imports.insert(key.clone()) {
                return Ok(false);
            }
        }

        let accepted = self.fan_out("add_import", |r| r.add_import(import)).await;

        let mut state = self.state.write().await;
        state.adding_imports.remove(&key);
        if !accepted {
            return Err(SyncError::Persistence(format!(
                "no repository accepted import {key}"
            )));
        }
        state.imports.insert(key, import.clone());
        Ok(true)
    }

    /// Persist the settings of an import and refresh the cache
    pub async fn update_import(&self, import: &Import) -> Result<()> {
        if self.get_import(&import.path, &import.media_type).await.is_none() {
            return Err(SyncError::unknown_import(&import.path, &import.media_type));
        }

        if !self.fan_out("update_import", |r| r.update_import(import)).await {
            return Err(SyncError::Persistence(format!(
                "no repository accepted update of import {}",
                import.key()
            )));
        }

        self.state
            .write()
            .await
            .imports
            .insert(import.key(), import.clone());
        Ok(())
    }

    /// Stamp an import and its source as synchronized at `when`
    pub async fn update_last_synced(&self, import: &Import, when: DateTime<Utc>) -> Result<Import> {
        let mut updated = self
            .get_import(&import.path, &import.media_type)
            .await
            .ok_or_else(|| SyncError::unknown_import(&import.path, &import.media_type))?;
        updated.last_synced = Some(when);
        updated.source.last_synced = Some(when);

        if !self
            .fan_out("update_last_sync", |r| r.update_last_sync(&updated))
            .await
        {
            return Err(SyncError::Persistence(format!(
                "no repository recorded last sync of {}",
                import.key()
            )));
        }

        let mut state = self.state.write().await;
        // Removed while the repositories were written
        let Some(cached) = state.imports.get_mut(&updated.key()) else {
            return Err(SyncError::unknown_import(&import.path, &import.media_type));
        };
        cached.last_synced = Some(when);
        cached.source.last_synced = Some(when);
        let updated = cached.clone();
        if let Some(source) = state.sources.get_mut(import.source_id()) {
            source.last_synced = Some(when);
        }

        Ok(updated)
    }

    /// Remove an import from every repository and the cache
    pub async fn remove_import(&self, path: &str, media_type: &MediaType) -> Result<()> {
        if self.get_import(path, media_type).await.is_none() {
            return Err(SyncError::unknown_import(path, media_type));
        }

        if !self
            .fan_out("remove_import", |r| r.remove_import(path, media_type))
            .await
        {
            return Err(SyncError::Persistence(format!(
                "no repository removed import {path} [{media_type}]"
            )));
        }

        self.state
            .write()
            .await
            .imports
            .remove(&ImportKey::new(path, media_type.clone()));
        Ok(())
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("repositories", &self.repositories.len())
            .finish_non_exhaustive()
    }
}
