//! Lumen Sync - Import synchronization engine
//!
//! Keeps a local media library in step with external sources. Sources are
//! announced through [`ImportManager::register_source`], imports describe
//! which media types to pull from which path, and background jobs run the
//! retrieval, changeset and synchronization pipeline through the registered
//! importers and media type handlers.

mod changeset;
mod config;
mod error;
mod events;
mod jobs;
mod manager;
mod ordering;
mod plugins;
mod registry;
mod tasks;
mod types;

// Public exports
pub use changeset::{compute_changeset, ChangesetStats};
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use events::ImportEvent;
pub use jobs::JobRunner;
pub use manager::ImportManager;
pub use ordering::DependencyOrder;
pub use plugins::PluginRegistry;
pub use registry::SourceRegistry;
pub use tasks::{Task, TaskKind, TaskOutput};
pub use types::{JobInfo, JobKey, JobProgress, JobState};
