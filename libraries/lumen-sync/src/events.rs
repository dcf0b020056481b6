//! Change notifications
//!
//! Events carry identifying keys only. Listeners re-query the manager when
//! they need the full record.

use lumen_core::MediaType;
use serde::{Deserialize, Serialize};

/// Events emitted by the import manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImportEvent {
    /// A new source was registered and persisted
    SourceAdded {
        /// Identifier of the source
        source_id: String,
    },

    /// Name, icon or media types of a source changed
    SourceUpdated {
        /// Identifier of the source
        source_id: String,
    },

    /// A source and all of its imports were removed
    SourceRemoved {
        /// Identifier of the source
        source_id: String,
    },

    /// A source became reachable or unreachable
    SourceActiveChanged {
        /// Identifier of the source
        source_id: String,
        /// New state
        active: bool,
    },

    /// An import was added
    ImportAdded {
        /// Import path
        path: String,
        /// Imported media type
        media_type: MediaType,
    },

    /// Settings or last-synced time of an import changed
    ImportUpdated {
        /// Import path
        path: String,
        /// Imported media type
        media_type: MediaType,
    },

    /// An import was removed
    ImportRemoved {
        /// Import path
        path: String,
        /// Imported media type
        media_type: MediaType,
    },
}
