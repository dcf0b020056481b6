use lumen_core::{LumenError, MediaType};
use thiserror::Error;

/// Errors that can occur during import synchronization
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Unknown import: {path} [{media_type}]")]
    UnknownImport { path: String, media_type: MediaType },

    #[error("No importer can handle {0}")]
    NoImporter(String),

    #[error("No handler registered for media type {0}")]
    NoHandler(MediaType),

    #[error("Media type {0} is missing one of its required media types")]
    UnsupportedMediaType(MediaType),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Plugin panicked during {0} task")]
    PluginPanic(String),

    #[error("Plugin error: {0}")]
    Plugin(#[from] LumenError),

    #[error("Job was cancelled")]
    Cancelled,
}

impl SyncError {
    /// Whether the error is a configuration problem (unknown source or
    /// import, duplicate add, missing importer or handler)
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownSource(_)
                | Self::UnknownImport { .. }
                | Self::NoImporter(_)
                | Self::NoHandler(_)
                | Self::UnsupportedMediaType(_)
                | Self::InvalidInput(_)
        )
    }

    /// Create an unknown import error
    pub fn unknown_import(path: impl Into<String>, media_type: &MediaType) -> Self {
        Self::UnknownImport {
            path: path.into(),
            media_type: media_type.clone(),
        }
    }

    /// Map a plugin error raised while talking to a source
    pub(crate) fn retrieval(err: LumenError) -> Self {
        match err {
            LumenError::Cancelled => Self::Cancelled,
            other => Self::Retrieval(other.to_string()),
        }
    }

    /// Map a plugin error raised by a media type handler
    pub(crate) fn handler(err: LumenError) -> Self {
        match err {
            LumenError::Cancelled => Self::Cancelled,
            other => Self::Handler(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
