//! Media item records
//!
//! The engine treats items as opaque records. Only the identifier and the
//! split between content fields and playback fields matter to change
//! detection; everything else is carried through to the handler untouched.

use crate::types::MediaType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Playback state of an item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackInfo {
    /// Number of completed plays
    pub play_count: u32,
    /// When the item was last played
    pub last_played: Option<DateTime<Utc>>,
    /// Resume position in milliseconds
    pub resume_position_ms: Option<u64>,
}

/// A media item as retrieved from a source or stored locally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    /// Stable identifier on the source (usually a path or URL)
    pub identifier: String,

    /// Media type of the item
    pub media_type: MediaType,

    /// Display title
    pub title: String,

    /// Release year
    #[serde(default)]
    pub year: Option<i32>,

    /// Identifier of the containing item (the show of a season, the season of an episode)
    #[serde(default)]
    pub parent: Option<String>,

    /// Free-form metadata fields
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,

    /// Playback state
    #[serde(default)]
    pub playback: PlaybackInfo,

    /// Local library id assigned by the handler; never compared
    #[serde(default)]
    pub library_id: Option<String>,

    /// Path of the import the item belongs to; never compared
    #[serde(default)]
    pub import_path: Option<String>,

    /// Whether the item is visible in the library; never compared
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl MediaItem {
    /// Create an item with only identifier, media type and title set
    pub fn new(
        identifier: impl Into<String>,
        media_type: impl Into<MediaType>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            media_type: media_type.into(),
            title: title.into(),
            year: None,
            parent: None,
            metadata: BTreeMap::new(),
            playback: PlaybackInfo::default(),
            library_id: None,
            import_path: None,
            enabled: true,
        }
    }

    /// Set the release year
    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    /// Set the containing item
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Add a metadata field
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set the playback state
    pub fn with_playback(mut self, playback: PlaybackInfo) -> Self {
        self.playback = playback;
        self
    }

    /// Whether the content fields differ from `other`.
    ///
    /// Playback fields are only compared when `include_playback` is set.
    /// Bookkeeping fields (`library_id`, `import_path`, `enabled`) never are.
    pub fn differs_from(&self, other: &MediaItem, include_playback: bool) -> bool {
        if self.identifier != other.identifier
            || self.media_type != other.media_type
            || self.title != other.title
            || self.year != other.year
            || self.parent != other.parent
            || self.metadata != other.metadata
        {
            return true;
        }

        include_playback && self.playback != other.playback
    }
}
