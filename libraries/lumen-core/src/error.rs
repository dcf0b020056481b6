/// Core error types for Lumen
use thiserror::Error;

/// Result type alias using `LumenError`
pub type Result<T> = std::result::Result<T, LumenError>;

/// Error raised by plugins (importers, handlers) and repositories
#[derive(Error, Debug)]
pub enum LumenError {
    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// An importer or handler failed
    #[error("Plugin error: {0}")]
    Plugin(String),

    /// Entity not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Operation not supported by this plugin
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Work was cancelled before it finished
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl LumenError {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a plugin error
    pub fn plugin(msg: impl Into<String>) -> Self {
        Self::Plugin(msg.into())
    }

    /// Create a not found error
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
