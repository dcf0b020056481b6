//! Importer and handler registration tables
//!
//! Importer factories are keyed by protocol, handlers by media type. The
//! handler list is kept sorted in dependency order so synchronization can
//! simply iterate it (and removal iterate it backwards).

use crate::ordering::DependencyOrder;
use lumen_core::{ImporterFactory, MediaType, MediaTypeHandler};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Default)]
struct PluginTables {
    importers: Vec<Arc<dyn ImporterFactory>>,
    /// Sorted in dependency order
    handlers: Vec<Arc<dyn MediaTypeHandler>>,
    order: DependencyOrder,
}

/// Registry of importer factories and media type handlers
#[derive(Default)]
pub struct PluginRegistry {
    tables: RwLock<PluginTables>,
}

impl PluginRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an importer factory. Returns false if the protocol is taken.
    pub async fn register_importer(&self, importer: Arc<dyn ImporterFactory>) -> bool {
        let mut tables = self.tables.write().await;

        if tables
            .importers
            .iter()
            .any(|existing| existing.protocol() == importer.protocol())
        {
            warn!("Importer for protocol {} already registered", importer.protocol());
            return false;
        }

        info!("Registered importer for protocol {}", importer.protocol());
        tables.importers.push(importer);
        true
    }

    /// Register a media type handler. Returns false if the media type is taken.
    pub async fn register_handler(&self, handler: Arc<dyn MediaTypeHandler>) -> bool {
        let media_type = handler.media_type();
        let mut tables = self.tables.write().await;

        if tables.handlers.iter().any(|h| h.media_type() == media_type) {
            warn!("Handler for media type {} already registered", media_type);
            return false;
        }

        tables
            .order
            .insert(media_type.clone(), handler.dependencies());
        tables.handlers.push(handler);

        let PluginTables {
            handlers, order, ..
        } = &mut *tables;
        handlers.sort_by_key(|h| order.position(&h.media_type()).unwrap_or(usize::MAX));

        info!("Registered handler for media type {}", media_type);
        true
    }

    /// Find the first importer factory able to import `path`
    pub async fn find_importer(&self, path: &str) -> Option<Arc<dyn ImporterFactory>> {
        // Probing may hit the network, so it runs on a snapshot outside the lock
        let importers = self.tables.read().await.importers.clone();

        for importer in importers {
            if importer.can_import(path).await {
                debug!("Importer {} accepts {}", importer.protocol(), path);
                return Some(importer);
            }
        }

        None
    }

    /// Importer factory registered for `protocol`
    pub async fn importer(&self, protocol: &str) -> Option<Arc<dyn ImporterFactory>> {
        self.tables
            .read()
            .await
            .importers
            .iter()
            .find(|i| i.protocol() == protocol)
            .cloned()
    }

    /// Handler registered for `media_type`
    pub async fn handler(&self, media_type: &MediaType) -> Option<Arc<dyn MediaTypeHandler>> {
        self.tables
            .read()
            .await
            .handlers
            .iter()
            .find(|h| &h.media_type() == media_type)
            .cloned()
    }

    /// All handlers in dependency order
    pub async fn handlers(&self) -> Vec<Arc<dyn MediaTypeHandler>> {
        self.tables.read().await.handlers.clone()
    }

    /// Whether `media_type` has a handler whose required media types all have handlers too
    pub async fn is_supported(&self, media_type: &MediaType) -> bool {
        let tables = self.tables.read().await;
        let Some(handler) = tables.handlers.iter().find(|h| &h.media_type() == media_type) else {
            return false;
        };

        handler
            .required_media_types()
            .iter()
            .all(|required| tables.handlers.iter().any(|h| &h.media_type() == required))
    }

    /// Supported media types in dependency order
    pub async fn supported_media_types(&self) -> Vec<MediaType> {
        let handlers = self.handlers().await;
        let mut supported = Vec::with_capacity(handlers.len());
        for handler in handlers {
            let media_type = handler.media_type();
            if self.is_supported(&media_type).await {
                supported.push(media_type);
            }
        }
        supported
    }

    /// Media types grouped with `media_type`, always including itself
    pub async fn grouped_media_types(&self, media_type: &MediaType) -> Vec<MediaType> {
        let mut grouped = match self.handler(media_type).await {
            Some(handler) => handler.grouped_media_types(),
            None => Vec::new(),
        };
        if !grouped.contains(media_type) {
            grouped.push(media_type.clone());
        }
        self.sort_media_types(&mut grouped).await;
        grouped
    }

    /// Media types that depend on, or are grouped with, `media_type`
    /// (excluding itself), in dependency order
    pub async fn related_media_types(&self, media_type: &MediaType) -> Vec<MediaType> {
        let mut related: BTreeSet<MediaType> = self
            .tables
            .read()
            .await
            .order
            .dependents_of(media_type)
            .into_iter()
            .collect();
        related.extend(self.grouped_media_types(media_type).await);
        related.remove(media_type);

        let mut related: Vec<MediaType> = related.into_iter().collect();
        self.sort_media_types(&mut related).await;
        related
    }

    /// Sort media types into dependency order
    pub async fn sort_media_types(&self, media_types: &mut [MediaType]) {
        self.tables.read().await.order.sort(media_types);
    }

    /// Sort media types into reverse dependency order
    pub async fn sort_media_types_reverse(&self, media_types: &mut [MediaType]) {
        self.tables.read().await.order.sort_reverse(media_types);
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry").finish_non_exhaustive()
    }
}
