//! Task kinds of the synchronization pipeline
//!
//! A job runs a queue of tasks. Each task produces a [`TaskOutput`], from
//! which the manager derives the follow-up tasks:
//!
//! ```text
//! Registration -> Retrieval -> Changeset -> Synchronization -> Cleanup
//! ```
//!
//! `Removal` and `Update` are never chained.

use crate::changeset::{compute_changeset, ChangesetStats};
use crate::error::{Result, SyncError};
use crate::plugins::PluginRegistry;
use futures_util::FutureExt;
use lumen_core::{
    ChangesetItem, ChangesetKind, Import, ImportKey, ImportSettings, LumenError, MediaItem,
    MediaTypeHandler, ProgressCallback, RetrievalContext, Source,
};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Kind of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Registration,
    Retrieval,
    Changeset,
    Synchronization,
    Cleanup,
    Removal,
    Update,
}

impl TaskKind {
    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Retrieval => "retrieval",
            Self::Changeset => "changeset",
            Self::Synchronization => "synchronization",
            Self::Cleanup => "cleanup",
            Self::Removal => "removal",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit of work inside a job
#[derive(Debug, Clone)]
pub enum Task {
    /// Validate a discovered source and declare its imports
    Registration {
        source: Source,
        /// Declare one import per supported media type of the source
        declare_imports: bool,
        /// Settings given to declared imports
        settings: ImportSettings,
    },
    /// Load local items and fetch the current remote items of an import
    Retrieval { import: Import },
    /// Diff retrieved items against local items
    Changeset {
        import: Import,
        retrieved: Vec<MediaItem>,
        local: Vec<MediaItem>,
    },
    /// Apply a changeset through the handler
    Synchronization {
        import: Import,
        changeset: Vec<ChangesetItem>,
    },
    /// Remove local items that lost their connection to any import
    Cleanup { import: Import },
    /// Delete every item of an import
    Removal { import: Import },
    /// Push one local edit back to the source
    Update { import: Import, item: MediaItem },
}

/// Result of a successfully completed task
#[derive(Debug, Clone)]
pub enum TaskOutput {
    Registered {
        source: Source,
        imports: Vec<Import>,
    },
    Retrieved {
        import: Import,
        retrieved: Vec<MediaItem>,
        local: Vec<MediaItem>,
    },
    Changeset {
        import: Import,
        changeset: Vec<ChangesetItem>,
    },
    Synchronized {
        import: Import,
        stats: ChangesetStats,
    },
    CleanedUp {
        import: Import,
    },
    Removed {
        import: Import,
    },
    Updated {
        import: Import,
        item: MediaItem,
    },
}

/// What a task gets to work with
pub(crate) struct TaskContext<'a> {
    pub plugins: &'a PluginRegistry,
    pub cancel: &'a CancellationToken,
    pub progress: ProgressCallback,
}

impl Task {
    /// Kind of this task
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Registration { .. } => TaskKind::Registration,
            Self::Retrieval { .. } => TaskKind::Retrieval,
            Self::Changeset { .. } => TaskKind::Changeset,
            Self::Synchronization { .. } => TaskKind::Synchronization,
            Self::Cleanup { .. } => TaskKind::Cleanup,
            Self::Removal { .. } => TaskKind::Removal,
            Self::Update { .. } => TaskKind::Update,
        }
    }

    /// Key of the import the task works on. Registrations declare imports
    /// that do not exist yet and return `None`.
    pub fn import_key(&self) -> Option<ImportKey> {
        match self {
            Self::Registration { .. } => None,
            Self::Retrieval { import }
            | Self::Changeset { import, .. }
            | Self::Synchronization { import, .. }
            | Self::Cleanup { import }
            | Self::Removal { import }
            | Self::Update { import, .. } => Some(import.key()),
        }
    }

    /// Short description for logs
    pub fn describe(&self) -> String {
        match self {
            Self::Registration { source, .. } => format!("registration of {}", source.identifier),
            Self::Retrieval { import }
            | Self::Changeset { import, .. }
            | Self::Synchronization { import, .. }
            | Self::Cleanup { import }
            | Self::Removal { import }
            | Self::Update { import, .. } => format!("{} of {}", self.kind(), import.key()),
        }
    }

    /// Run the task, turning a panic inside a plugin into a task failure
    pub(crate) async fn execute(self, ctx: &TaskContext<'_>) -> Result<TaskOutput> {
        let kind = self.kind();
        match AssertUnwindSafe(self.run(ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                error!("Plugin panicked during {} task", kind);
                Err(SyncError::PluginPanic(kind.to_string()))
            }
        }
    }

    async fn run(self, ctx: &TaskContext<'_>) -> Result<TaskOutput> {
        match self {
            Self::Registration {
                source,
                declare_imports,
                settings,
            } => register(ctx, source, declare_imports, settings).await,
            Self::Retrieval { import } => retrieve(ctx, import).await,
            Self::Changeset {
                import,
                retrieved,
                local,
            } => {
                let handler = handler_for(ctx, &import).await?;
                let changeset = compute_changeset(
                    handler.as_ref(),
                    &import.settings,
                    retrieved,
                    local,
                    ctx.cancel,
                    Some(&ctx.progress),
                )?;
                Ok(TaskOutput::Changeset { import, changeset })
            }
            Self::Synchronization { import, changeset } => {
                synchronize(ctx, import, changeset).await
            }
            Self::Cleanup { import } => {
                // The import is already synchronized; a failed cleanup only
                // leaves stale items behind until the next run
                let handler = handler_for(ctx, &import).await?;
                match handler.cleanup_imported_items(&import).await {
                    Ok(()) => {}
                    Err(LumenError::Cancelled) => return Err(SyncError::Cancelled),
                    Err(e) => warn!("Cleanup of {} failed: {}", import.key(), e),
                }
                Ok(TaskOutput::CleanedUp { import })
            }
            Self::Removal { import } => {
                let handler = handler_for(ctx, &import).await?;
                handler
                    .remove_imported_items(&import)
                    .await
                    .map_err(SyncError::handler)?;
                info!("Removed all items of {}", import.key());
                Ok(TaskOutput::Removed { import })
            }
            Self::Update { import, item } => {
                let factory = ctx
                    .plugins
                    .find_importer(&import.path)
                    .await
                    .ok_or_else(|| SyncError::NoImporter(import.path.clone()))?;
                let mut importer = factory.create(&import).map_err(SyncError::retrieval)?;
                importer
                    .update_on_source(&item)
                    .await
                    .map_err(SyncError::retrieval)?;
                debug!("Updated {} on source", item.identifier);
                Ok(TaskOutput::Updated { import, item })
            }
        }
    }
}

async fn handler_for(ctx: &TaskContext<'_>, import: &Import) -> Result<Arc<dyn MediaTypeHandler>> {
    ctx.plugins
        .handler(&import.media_type)
        .await
        .ok_or_else(|| SyncError::NoHandler(import.media_type.clone()))
}

async fn register(
    ctx: &TaskContext<'_>,
    source: Source,
    declare_imports: bool,
    settings: ImportSettings,
) -> Result<TaskOutput> {
    let importer = ctx
        .plugins
        .find_importer(&source.identifier)
        .await
        .ok_or_else(|| SyncError::NoImporter(source.identifier.clone()))?;
    debug!(
        "Source {} handled by importer {}",
        source.identifier,
        importer.protocol()
    );

    let mut imports = Vec::new();
    if declare_imports {
        let mut media_types: Vec<_> = source.available_media_types.iter().cloned().collect();
        ctx.plugins.sort_media_types(&mut media_types).await;

        for media_type in media_types {
            if ctx.plugins.is_supported(&media_type).await {
                imports.push(
                    Import::new(source.identifier.clone(), media_type, source.clone())
                        .with_settings(settings.clone()),
                );
            } else {
                debug!(
                    "Source {} offers unsupported media type {}",
                    source.identifier, media_type
                );
            }
        }
    }

    Ok(TaskOutput::Registered { source, imports })
}

async fn retrieve(ctx: &TaskContext<'_>, import: Import) -> Result<TaskOutput> {
    let handler = handler_for(ctx, &import).await?;
    let factory = ctx
        .plugins
        .find_importer(&import.path)
        .await
        .ok_or_else(|| SyncError::NoImporter(import.path.clone()))?;

    let local = handler
        .get_local_items(&import)
        .await
        .map_err(SyncError::handler)?;

    if ctx.cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }

    let mut importer = factory.create(&import).map_err(SyncError::retrieval)?;
    let mut retrieval = RetrievalContext::new(&import, &local, ctx.cancel.clone())
        .with_progress(ctx.progress.clone());
    importer
        .import(&mut retrieval)
        .await
        .map_err(SyncError::retrieval)?;

    if ctx.cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }

    let mut retrieved = retrieval.into_items();
    for item in &mut retrieved {
        item.import_path = Some(import.path.clone());
    }

    debug!(
        "Retrieved {} items for {} ({} stored locally)",
        retrieved.len(),
        import.key(),
        local.len()
    );

    Ok(TaskOutput::Retrieved {
        import,
        retrieved,
        local,
    })
}

async fn synchronize(
    ctx: &TaskContext<'_>,
    import: Import,
    changeset: Vec<ChangesetItem>,
) -> Result<TaskOutput> {
    let handler = handler_for(ctx, &import).await?;
    let stats = ChangesetStats::from_changeset(&changeset);
    let total = changeset.len();

    for (index, entry) in changeset.iter().enumerate() {
        // Individual items are the smallest unit of atomicity
        if ctx.cancel.is_cancelled() {
            info!(
                "Synchronization of {} cancelled after {} of {} items",
                import.key(),
                index,
                total
            );
            return Err(SyncError::Cancelled);
        }

        let result = match entry.kind {
            ChangesetKind::Added => handler.add_imported_item(&import, &entry.item).await,
            ChangesetKind::Changed => handler.update_imported_item(&import, &entry.item).await,
            ChangesetKind::Removed => handler.remove_imported_item(&import, &entry.item).await,
            ChangesetKind::None => Ok(()),
        };
        result.map_err(SyncError::handler)?;

        (ctx.progress)(index + 1, total);
    }

    info!(
        "Synchronized {}: {} added, {} changed, {} removed",
        import.key(),
        stats.added,
        stats.changed,
        stats.removed
    );

    Ok(TaskOutput::Synchronized { import, stats })
}
