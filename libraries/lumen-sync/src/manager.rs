//! Import manager
//!
//! The manager owns the plugin tables, the source registry and the job
//! runner. Every public method is safe to call concurrently; long running
//! work is queued as background jobs and reported through
//! [`ImportManager::subscribe_progress`].

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::events::ImportEvent;
use crate::jobs::{JobDriver, JobRunner};
use crate::plugins::PluginRegistry;
use crate::registry::SourceRegistry;
use crate::tasks::{Task, TaskContext, TaskOutput};
use crate::types::{JobInfo, JobKey, JobProgress};
use async_trait::async_trait;
use chrono::Utc;
use lumen_core::{
    Import, ImportKey, ImportRepository, ImportSettings, ImportTrigger, ImporterFactory,
    MediaItem, MediaType, MediaTypeHandler, Source,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

struct ManagerInner {
    config: SyncConfig,
    plugins: PluginRegistry,
    registry: SourceRegistry,
    jobs: JobRunner,
    events: broadcast::Sender<ImportEvent>,
}

/// Orchestrates sources, imports and their synchronization jobs
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct ImportManager {
    inner: Arc<ManagerInner>,
}

impl ImportManager {
    /// Create a manager persisting to the given repositories
    pub fn new(config: SyncConfig, repositories: Vec<Arc<dyn ImportRepository>>) -> Result<Self> {
        config.validate().map_err(SyncError::InvalidInput)?;

        let (events, _) = broadcast::channel(config.event_capacity);
        let jobs = JobRunner::new(config.max_concurrent_jobs, config.event_capacity);

        Ok(Self {
            inner: Arc::new(ManagerInner {
                config,
                plugins: PluginRegistry::new(),
                registry: SourceRegistry::new(repositories),
                jobs,
                events,
            }),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Importer and handler tables
    pub fn plugins(&self) -> &PluginRegistry {
        &self.inner.plugins
    }

    // Plugins

    /// Register an importer factory. Returns false if its protocol is taken.
    pub async fn register_importer(&self, importer: Arc<dyn ImporterFactory>) -> bool {
        self.inner.plugins.register_importer(importer).await
    }

    /// Register a media type handler. Returns false if its media type is taken.
    pub async fn register_handler(&self, handler: Arc<dyn MediaTypeHandler>) -> bool {
        self.inner.plugins.register_handler(handler).await
    }

    // Sources

    /// Announce a discovered source.
    ///
    /// An unknown source is validated and persisted by a background
    /// registration job. A known source has its name, icon and media types
    /// reconciled right away, is re-activated, and gets its imports
    /// synchronized. Returns whether a job was queued.
    pub async fn register_source(&self, source: Source) -> Result<bool> {
        if source.identifier.is_empty() {
            return Err(SyncError::InvalidInput("source identifier is empty".to_string()));
        }

        let Some(existing) = self.inner.registry.get_source(&source.identifier).await else {
            info!("Registering new source {}", source.identifier);
            let source_id = source.identifier.clone();
            let task = Task::Registration {
                source: source.with_active(true),
                declare_imports: self.inner.config.auto_add_imports,
                settings: self.inner.config.default_settings.clone(),
            };
            return Ok(self
                .queue(JobKey::Source(source_id.clone()), &source_id, vec![task])
                .await);
        };

        self.reconcile_source(&existing, &source).await?;
        self.activate_source(&existing.identifier).await?;

        if self.inner.config.auto_add_imports {
            self.declare_missing_imports(&existing.identifier).await?;
        }

        if self.inner.config.sync_on_register {
            return self.queue_source_sync(&existing.identifier, true).await;
        }
        Ok(false)
    }

    /// Mark a source unreachable.
    ///
    /// Jobs of the source are cancelled and the items imported from it are
    /// disabled, never deleted.
    pub async fn unregister_source(&self, source_id: &str) -> Result<()> {
        let Some(source) = self.inner.registry.set_source_active(source_id, false).await? else {
            debug!("Source {} already inactive", source_id);
            return Ok(());
        };

        info!("Unregistering source {}", source_id);
        self.inner.jobs.cancel_source(source_id).await;
        self.inner.jobs.wait_for_source(source_id).await;

        let mut imports = self.inner.registry.get_imports_by_source(source_id).await;
        self.sort_imports(&mut imports, true).await;
        self.set_items_enabled(&imports, false).await;

        self.emit(ImportEvent::SourceActiveChanged {
            source_id: source.identifier,
            active: false,
        });
        Ok(())
    }

    /// Delete a source, all of its imports and every item imported from it
    pub async fn remove_source(&self, source_id: &str) -> Result<()> {
        if !self.inner.registry.has_source(source_id).await {
            return Err(SyncError::UnknownSource(source_id.to_string()));
        }

        info!("Removing source {}", source_id);
        let mut imports = self.inner.registry.get_imports_by_source(source_id).await;
        self.sort_imports(&mut imports, true).await;

        // Forget the source first so no new job can pick it up, then stop
        // the jobs already running for it
        self.inner.registry.remove_source(source_id).await?;
        self.inner.jobs.cancel_source(source_id).await;
        self.inner.jobs.wait_for_source(source_id).await;

        for import in &imports {
            self.remove_items(import).await;
        }

        for import in imports {
            self.emit(ImportEvent::ImportRemoved {
                path: import.path,
                media_type: import.media_type,
            });
        }
        self.emit(ImportEvent::SourceRemoved {
            source_id: source_id.to_string(),
        });
        Ok(())
    }

    /// All known sources, optionally filtered by their active state
    pub async fn get_sources(&self, active: Option<bool>) -> Vec<Source> {
        self.inner.registry.get_sources(active).await
    }

    /// A source by identifier
    pub async fn get_source(&self, source_id: &str) -> Option<Source> {
        self.inner.registry.get_source(source_id).await
    }

    // Imports

    /// Add an import of one media type. See [`add_imports`](Self::add_imports).
    pub async fn add_import(
        &self,
        source_id: &str,
        path: &str,
        media_type: &MediaType,
    ) -> Result<Vec<Import>> {
        self.add_imports(source_id, path, std::slice::from_ref(media_type))
            .await
    }

    /// Add imports of several media types below one path.
    ///
    /// The requested media types are extended with their grouped types.
    /// Imports that already exist are skipped without error. When the
    /// source is active the new imports are synchronized in dependency
    /// order. Returns the imports that were actually added.
    pub async fn add_imports(
        &self,
        source_id: &str,
        path: &str,
        media_types: &[MediaType],
    ) -> Result<Vec<Import>> {
        if path.is_empty() {
            return Err(SyncError::InvalidInput("import path is empty".to_string()));
        }
        if media_types.is_empty() {
            return Err(SyncError::InvalidInput("no media types given".to_string()));
        }

        let source = self
            .inner
            .registry
            .get_source(source_id)
            .await
            .ok_or_else(|| SyncError::UnknownSource(source_id.to_string()))?;

        let mut expanded = Vec::new();
        for media_type in media_types {
            self.ensure_supported(media_type).await?;
            for grouped in self.inner.plugins.grouped_media_types(media_type).await {
                if expanded.contains(&grouped) {
                    continue;
                }
                if self.inner.plugins.is_supported(&grouped).await {
                    expanded.push(grouped);
                } else {
                    warn!("Grouped media type {} of {} is not supported", grouped, media_type);
                }
            }
        }
        self.inner.plugins.sort_media_types(&mut expanded).await;

        let mut added = Vec::new();
        for media_type in expanded {
            let import = Import::new(path, media_type, source.clone())
                .with_settings(self.inner.config.default_settings.clone());
            if self.inner.registry.add_import(&import).await? {
                info!("Added import {}", import.key());
                self.emit(ImportEvent::ImportAdded {
                    path: import.path.clone(),
                    media_type: import.media_type.clone(),
                });
                added.push(import);
            } else {
                debug!("Import {} already exists", import.key());
            }
        }

        if source.active && !added.is_empty() {
            let tasks = added
                .iter()
                .map(|import| Task::Retrieval {
                    import: import.clone(),
                })
                .collect();
            self.queue(JobKey::Import(path.to_string()), source_id, tasks)
                .await;
        }

        Ok(added)
    }

    /// Replace the settings of an import
    pub async fn update_import(
        &self,
        path: &str,
        media_type: &MediaType,
        settings: ImportSettings,
    ) -> Result<Import> {
        let import = self.require_import(path, media_type).await?;
        let import = import.with_settings(settings);

        self.inner.registry.update_import(&import).await?;
        self.emit(ImportEvent::ImportUpdated {
            path: import.path.clone(),
            media_type: import.media_type.clone(),
        });
        Ok(import)
    }

    /// Remove an import together with every import at the same path whose
    /// media type depends on or is grouped with it.
    ///
    /// Items are removed in reverse dependency order. Returns the removed
    /// imports.
    pub async fn remove_import(&self, path: &str, media_type: &MediaType) -> Result<Vec<Import>> {
        let import = self.require_import(path, media_type).await?;
        let source_id = import.source_id();

        let mut imports = self.with_related_imports(path, media_type).await;
        self.sort_imports(&mut imports, true).await;

        // Forget the imports first so no new job can pick them up, then stop
        // every job still working on them, whatever key it runs under
        for import in &imports {
            self.inner
                .registry
                .remove_import(&import.path, &import.media_type)
                .await?;
        }
        let keys: Vec<ImportKey> = imports.iter().map(Import::key).collect();
        self.inner.jobs.cancel_imports(source_id, &keys).await;
        self.inner.jobs.wait_for_imports(source_id, &keys).await;

        for import in &imports {
            self.remove_items(import).await;
            info!("Removed import {}", import.key());
            self.emit(ImportEvent::ImportRemoved {
                path: import.path.clone(),
                media_type: import.media_type.clone(),
            });
        }

        Ok(imports)
    }

    /// All imports
    pub async fn get_imports(&self) -> Vec<Import> {
        self.inner.registry.get_imports().await
    }

    /// Imports of one source
    pub async fn get_imports_by_source(&self, source_id: &str) -> Vec<Import> {
        self.inner.registry.get_imports_by_source(source_id).await
    }

    /// Imports of one media type
    pub async fn get_imports_by_media_type(&self, media_type: &MediaType) -> Vec<Import> {
        self.inner.registry.get_imports_by_media_type(media_type).await
    }

    /// An import by path and media type
    pub async fn get_import(&self, path: &str, media_type: &MediaType) -> Option<Import> {
        self.inner.registry.get_import(path, media_type).await
    }

    // Synchronization

    /// Synchronize the automatic imports of every active source.
    ///
    /// Returns the number of jobs queued.
    pub async fn import_all(&self) -> Result<usize> {
        let mut queued = 0;
        for source in self.inner.registry.get_sources(Some(true)).await {
            if self.queue_source_sync(&source.identifier, true).await? {
                queued += 1;
            }
        }
        info!("Queued {} source synchronizations", queued);
        Ok(queued)
    }

    /// Synchronize every import of one source, manual ones included
    pub async fn import_source(&self, source_id: &str) -> Result<bool> {
        let source = self
            .inner
            .registry
            .get_source(source_id)
            .await
            .ok_or_else(|| SyncError::UnknownSource(source_id.to_string()))?;

        if !source.active {
            debug!("Not synchronizing inactive source {}", source_id);
            return Ok(false);
        }
        self.queue_source_sync(source_id, false).await
    }

    /// Synchronize one import and every import at the same path whose media
    /// type depends on or is grouped with it
    pub async fn import_path(&self, path: &str, media_type: &MediaType) -> Result<bool> {
        let import = self.require_import(path, media_type).await?;
        if !import.active {
            debug!("Not synchronizing {} of inactive source", import.key());
            return Ok(false);
        }

        let mut imports = self.with_related_imports(path, media_type).await;
        self.sort_imports(&mut imports, false).await;

        let tasks = imports
            .into_iter()
            .map(|import| Task::Retrieval { import })
            .collect();
        Ok(self
            .queue(JobKey::Import(path.to_string()), import.source_id(), tasks)
            .await)
    }

    /// Push a local edit of an imported item back to its source.
    ///
    /// Returns false when the source is inactive, the importer cannot write
    /// the changed fields, or a job for the import path is already running.
    pub async fn update_imported_item(&self, item: MediaItem) -> Result<bool> {
        let path = item
            .import_path
            .clone()
            .ok_or_else(|| SyncError::InvalidInput(format!("{} was not imported", item.identifier)))?;
        let import = self.require_import(&path, &item.media_type).await?;

        if !import.active {
            debug!("Source of {} is inactive", import.key());
            return Ok(false);
        }

        let factory = self
            .inner
            .plugins
            .find_importer(&path)
            .await
            .ok_or_else(|| SyncError::NoImporter(path.clone()))?;

        let playback = import.settings.update_playback_metadata_on_source
            && (factory.can_update_playcount_on_source(&path)
                || factory.can_update_last_played_on_source(&path)
                || factory.can_update_resume_position_on_source(&path));
        if !factory.can_update_metadata_on_source(&path) && !playback {
            debug!("Importer {} cannot update {}", factory.protocol(), path);
            return Ok(false);
        }

        let source_id = import.source_id().to_string();
        Ok(self
            .queue(
                JobKey::Import(path),
                &source_id,
                vec![Task::Update { import, item }],
            )
            .await)
    }

    // Observation and control

    /// Subscribe to source and import change events
    pub fn subscribe(&self) -> broadcast::Receiver<ImportEvent> {
        self.inner.events.subscribe()
    }

    /// Subscribe to job progress updates
    pub fn subscribe_progress(&self) -> broadcast::Receiver<JobProgress> {
        self.inner.jobs.subscribe()
    }

    /// Snapshot of queued and running jobs
    pub async fn jobs(&self) -> Vec<JobInfo> {
        self.inner.jobs.jobs().await
    }

    /// Stop starting new tasks
    pub fn pause(&self) {
        self.inner.jobs.pause();
    }

    /// Continue running tasks
    pub fn resume(&self) {
        self.inner.jobs.resume();
    }

    /// Wait until every queued job has finished
    pub async fn wait_idle(&self) {
        self.inner.jobs.wait_idle().await;
    }

    /// Cancel all jobs, wait for them to stop and refuse new ones
    pub async fn shutdown(&self) {
        self.inner.jobs.shutdown();
        self.inner.jobs.wait_idle().await;
        info!("Import manager shut down");
    }

    // Internals

    async fn queue(&self, key: JobKey, source_id: &str, tasks: Vec<Task>) -> bool {
        let driver: Arc<dyn JobDriver> = self.inner.clone();
        self.inner.jobs.queue(key, source_id, tasks, driver).await
    }

    async fn queue_source_sync(&self, source_id: &str, automatic: bool) -> Result<bool> {
        let tasks = self.inner.sync_tasks(source_id, automatic).await;
        Ok(self
            .queue(JobKey::Source(source_id.to_string()), source_id, tasks)
            .await)
    }

    async fn require_import(&self, path: &str, media_type: &MediaType) -> Result<Import> {
        self.inner
            .registry
            .get_import(path, media_type)
            .await
            .ok_or_else(|| SyncError::unknown_import(path, media_type))
    }

    async fn ensure_supported(&self, media_type: &MediaType) -> Result<()> {
        if self.inner.plugins.handler(media_type).await.is_none() {
            return Err(SyncError::NoHandler(media_type.clone()));
        }
        if !self.inner.plugins.is_supported(media_type).await {
            return Err(SyncError::UnsupportedMediaType(media_type.clone()));
        }
        Ok(())
    }

    /// The import itself plus the imports at `path` that depend on or are
    /// grouped with its media type
    async fn with_related_imports(&self, path: &str, media_type: &MediaType) -> Vec<Import> {
        let related = self.inner.plugins.related_media_types(media_type).await;
        self.inner
            .registry
            .get_imports_by_path(path)
            .await
            .into_iter()
            .filter(|i| &i.media_type == media_type || related.contains(&i.media_type))
            .collect()
    }

    async fn sort_imports(&self, imports: &mut [Import], reverse: bool) {
        self.inner.sort_imports(imports, reverse).await;
    }

    async fn reconcile_source(&self, existing: &Source, announced: &Source) -> Result<()> {
        if existing.friendly_name == announced.friendly_name
            && existing.icon_url == announced.icon_url
            && existing.available_media_types == announced.available_media_types
        {
            return Ok(());
        }

        let mut updated = existing.clone();
        updated.friendly_name.clone_from(&announced.friendly_name);
        updated.icon_url.clone_from(&announced.icon_url);
        updated
            .available_media_types
            .clone_from(&announced.available_media_types);

        self.inner.registry.update_source(&updated).await?;
        info!("Updated source {}", updated.identifier);
        self.emit(ImportEvent::SourceUpdated {
            source_id: updated.identifier,
        });
        Ok(())
    }

    async fn activate_source(&self, source_id: &str) -> Result<()> {
        if self
            .inner
            .registry
            .set_source_active(source_id, true)
            .await?
            .is_none()
        {
            return Ok(());
        }

        info!("Source {} is active again", source_id);
        let mut imports = self.inner.registry.get_imports_by_source(source_id).await;
        self.sort_imports(&mut imports, false).await;
        self.set_items_enabled(&imports, true).await;

        self.emit(ImportEvent::SourceActiveChanged {
            source_id: source_id.to_string(),
            active: true,
        });
        Ok(())
    }

    /// Add imports for supported media types a known source started offering
    async fn declare_missing_imports(&self, source_id: &str) -> Result<()> {
        let Some(source) = self.inner.registry.get_source(source_id).await else {
            return Ok(());
        };

        let mut missing = Vec::new();
        for media_type in &source.available_media_types {
            if self
                .inner
                .registry
                .get_import(&source.identifier, media_type)
                .await
                .is_none()
                && self.inner.plugins.is_supported(media_type).await
            {
                missing.push(media_type.clone());
            }
        }
        self.inner.plugins.sort_media_types(&mut missing).await;

        for media_type in missing {
            let import = Import::new(source.identifier.clone(), media_type, source.clone())
                .with_settings(self.inner.config.default_settings.clone());
            if self.inner.registry.add_import(&import).await? {
                info!("Added import {}", import.key());
                self.emit(ImportEvent::ImportAdded {
                    path: import.path,
                    media_type: import.media_type,
                });
            }
        }
        Ok(())
    }

    async fn set_items_enabled(&self, imports: &[Import], enabled: bool) {
        for import in imports {
            let Some(handler) = self.inner.plugins.handler(&import.media_type).await else {
                warn!("No handler for {}, items left as they are", import.key());
                continue;
            };
            if let Err(e) = handler.set_imported_items_enabled(import, enabled).await {
                warn!(
                    "Failed to {} items of {}: {}",
                    if enabled { "enable" } else { "disable" },
                    import.key(),
                    e
                );
            }
        }
    }

    /// Run a removal task right away instead of queueing it
    async fn remove_items(&self, import: &Import) {
        let cancel = CancellationToken::new();
        let ctx = TaskContext {
            plugins: &self.inner.plugins,
            cancel: &cancel,
            progress: Arc::new(|_: usize, _: usize| {}),
        };
        let task = Task::Removal {
            import: import.clone(),
        };
        if let Err(e) = task.execute(&ctx).await {
            error!("Failed to remove items of {}: {}", import.key(), e);
        }
    }

    fn emit(&self, event: ImportEvent) {
        self.inner.emit(event);
    }
}

impl std::fmt::Debug for ImportManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportManager")
            .field("plugins", &self.inner.plugins)
            .field("registry", &self.inner.registry)
            .field("jobs", &self.inner.jobs)
            .finish_non_exhaustive()
    }
}

impl ManagerInner {
    fn emit(&self, event: ImportEvent) {
        debug!("Event: {:?}", event);
        // No receivers is fine
        let _ = self.events.send(event);
    }

    async fn sort_imports(&self, imports: &mut [Import], reverse: bool) {
        let mut media_types: Vec<MediaType> = Vec::new();
        for import in imports.iter() {
            if !media_types.contains(&import.media_type) {
                media_types.push(import.media_type.clone());
            }
        }
        if reverse {
            self.plugins.sort_media_types_reverse(&mut media_types).await;
        } else {
            self.plugins.sort_media_types(&mut media_types).await;
        }

        let rank: HashMap<MediaType, usize> = media_types
            .into_iter()
            .enumerate()
            .map(|(index, media_type)| (media_type, index))
            .collect();
        imports.sort_by_key(|i| rank.get(&i.media_type).copied().unwrap_or(usize::MAX));
    }

    /// Retrieval tasks for the imports of a source, in dependency order.
    /// Automatic runs skip imports with a manual trigger.
    async fn sync_tasks(&self, source_id: &str, automatic: bool) -> Vec<Task> {
        let mut imports: Vec<Import> = self
            .registry
            .get_imports_by_source(source_id)
            .await
            .into_iter()
            .filter(|i| i.active)
            .filter(|i| !automatic || i.settings.import_trigger == ImportTrigger::Auto)
            .collect();
        self.sort_imports(&mut imports, false).await;

        imports
            .into_iter()
            .map(|import| Task::Retrieval { import })
            .collect()
    }

    /// Whether `import` still exists; a removed import ends its chain
    async fn is_known(&self, key: &JobKey, import: &Import) -> bool {
        let known = self
            .registry
            .get_import(&import.path, &import.media_type)
            .await
            .is_some();
        if !known {
            debug!("Job {}: {} was removed, dropping its remaining tasks", key, import.key());
        }
        known
    }

    async fn complete_registration(&self, source: Source, imports: Vec<Import>) -> Result<Vec<Task>> {
        self.registry.add_source(&source).await?;
        info!("Source {} registered", source.identifier);
        self.emit(ImportEvent::SourceAdded {
            source_id: source.identifier.clone(),
        });

        for import in &imports {
            if self.registry.add_import(import).await? {
                info!("Added import {}", import.key());
                self.emit(ImportEvent::ImportAdded {
                    path: import.path.clone(),
                    media_type: import.media_type.clone(),
                });
            }
        }

        if !self.config.sync_on_register {
            return Ok(Vec::new());
        }
        Ok(self.sync_tasks(&source.identifier, true).await)
    }
}

#[async_trait]
impl JobDriver for ManagerInner {
    fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    async fn on_task_complete(&self, key: &JobKey, output: TaskOutput) -> Result<Vec<Task>> {
        match output {
            TaskOutput::Registered { source, imports } => {
                self.complete_registration(source, imports).await
            }
            TaskOutput::Retrieved {
                import,
                retrieved,
                local,
            } => {
                if !self.is_known(key, &import).await {
                    return Ok(Vec::new());
                }
                Ok(vec![Task::Changeset {
                    import,
                    retrieved,
                    local,
                }])
            }
            TaskOutput::Changeset { import, changeset } => {
                if !self.is_known(key, &import).await {
                    return Ok(Vec::new());
                }
                Ok(vec![Task::Synchronization { import, changeset }])
            }
            TaskOutput::Synchronized { import, stats } => {
                let updated = match self.registry.update_last_synced(&import, Utc::now()).await {
                    Ok(updated) => updated,
                    Err(SyncError::UnknownImport { .. }) => {
                        debug!("Job {}: {} was removed during synchronization", key, import.key());
                        return Ok(Vec::new());
                    }
                    Err(e) => return Err(e),
                };
                debug!(
                    "Job {} finished {} with {} unchanged items",
                    key,
                    updated.key(),
                    stats.unchanged
                );
                self.emit(ImportEvent::ImportUpdated {
                    path: updated.path.clone(),
                    media_type: updated.media_type.clone(),
                });
                Ok(vec![Task::Cleanup { import: updated }])
            }
            TaskOutput::CleanedUp { import } => {
                debug!("Cleaned up {}", import.key());
                Ok(Vec::new())
            }
            TaskOutput::Removed { import } => {
                debug!("Removed items of {}", import.key());
                Ok(Vec::new())
            }
            TaskOutput::Updated { import, item } => {
                info!("Updated {} of {} on source", item.identifier, import.key());
                Ok(Vec::new())
            }
        }
    }
}
