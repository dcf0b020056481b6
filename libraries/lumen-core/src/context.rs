//! Retrieval context handed to importers
//!
//! Importers push the items they find into the context instead of returning
//! one big vector, so they can check for cancellation and report progress
//! while talking to a slow source.

use crate::types::{Import, MediaItem};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Callback for progress updates: `(processed, total)`
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// State of one retrieval run
pub struct RetrievalContext<'a> {
    import: &'a Import,
    local_items: &'a [MediaItem],
    retrieved: Vec<MediaItem>,
    cancel: CancellationToken,
    progress: Option<ProgressCallback>,
}

impl<'a> RetrievalContext<'a> {
    /// Create a context for retrieving the items of `import`
    pub fn new(import: &'a Import, local_items: &'a [MediaItem], cancel: CancellationToken) -> Self {
        Self {
            import,
            local_items,
            retrieved: Vec::new(),
            cancel,
            progress: None,
        }
    }

    /// Attach a progress callback
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// The import being retrieved
    pub fn import(&self) -> &Import {
        self.import
    }

    /// Items currently stored locally for the import
    pub fn local_items(&self) -> &[MediaItem] {
        self.local_items
    }

    /// Add a retrieved item
    pub fn push_item(&mut self, item: MediaItem) {
        self.retrieved.push(item);
    }

    /// Add several retrieved items
    pub fn push_items(&mut self, items: impl IntoIterator<Item = MediaItem>) {
        self.retrieved.extend(items);
    }

    /// Items retrieved so far
    pub fn retrieved(&self) -> &[MediaItem] {
        &self.retrieved
    }

    /// Whether the surrounding job has been cancelled
    pub fn should_cancel(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Report progress
    pub fn set_progress(&self, processed: usize, total: usize) {
        if let Some(progress) = &self.progress {
            progress(processed, total);
        }
    }

    /// Consume the context, returning the retrieved items
    pub fn into_items(self) -> Vec<MediaItem> {
        self.retrieved
    }
}

impl std::fmt::Debug for RetrievalContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalContext")
            .field("import", &self.import.key())
            .field("local_items", &self.local_items.len())
            .field("retrieved", &self.retrieved.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
