//! Lumen Core
//!
//! Data model, plugin contracts and error handling shared by every Lumen crate.
//!
//! # Architecture
//!
//! The core crate defines:
//! - **Domain Types**: `Source`, `Import`, `ImportSettings`, `MediaItem`, `ChangesetItem`
//! - **Plugin Contracts**: `ImporterFactory`, `Importer`, `MediaTypeHandler`, `ImportRepository`
//! - **Error Handling**: Unified `LumenError` and `Result` types
//!
//! # Example
//!
//! ```rust
//! use lumen_core::types::{media_types, Import, MediaType, Source};
//!
//! let source = Source::new("smb://nas/media", "NAS")
//!     .with_media_types([MediaType::new(media_types::MOVIE)]);
//!
//! let import = Import::new("smb://nas/media", media_types::MOVIE, source);
//! assert_eq!(import.key().to_string(), "smb://nas/media [movie]");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod context;
pub mod error;
pub mod traits;
pub mod types;

pub use context::{ProgressCallback, RetrievalContext};
pub use error::{LumenError, Result};
pub use traits::{ImportRepository, Importer, ImporterFactory, MediaTypeHandler};

pub use types::{
    media_types, ChangesetItem, ChangesetKind, Import, ImportKey, ImportSettings, ImportTrigger,
    MediaItem, MediaType, PlaybackInfo, Source,
};
