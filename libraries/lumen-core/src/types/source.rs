//! Media sources
//!
//! A source is an external provider of media items (a network share, a UPnP
//! server, a local folder). Sources are discovered at runtime and persisted
//! so that their imports survive restarts.

use crate::types::MediaType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An external media source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    /// Globally unique identifier (e.g. server UUID or share URL)
    pub identifier: String,

    /// Human readable name
    pub friendly_name: String,

    /// Icon shown next to the source
    #[serde(default)]
    pub icon_url: String,

    /// Media types the source can provide
    #[serde(default)]
    pub available_media_types: BTreeSet<MediaType>,

    /// Last time any import of this source finished synchronizing
    #[serde(default)]
    pub last_synced: Option<DateTime<Utc>>,

    /// Whether the source is currently reachable.
    ///
    /// Runtime state only: sources loaded from a repository start inactive
    /// until they are registered again.
    #[serde(default)]
    pub active: bool,
}

impl Source {
    /// Create a new, inactive source
    pub fn new(identifier: impl Into<String>, friendly_name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            friendly_name: friendly_name.into(),
            icon_url: String::new(),
            available_media_types: BTreeSet::new(),
            last_synced: None,
            active: false,
        }
    }

    /// Set the icon URL
    pub fn with_icon(mut self, icon_url: impl Into<String>) -> Self {
        self.icon_url = icon_url.into();
        self
    }

    /// Set the available media types
    pub fn with_media_types(mut self, media_types: impl IntoIterator<Item = MediaType>) -> Self {
        self.available_media_types = media_types.into_iter().collect();
        self
    }

    /// Mark the source active or inactive
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Whether the source declares the given media type
    pub fn provides(&self, media_type: &MediaType) -> bool {
        self.available_media_types.contains(media_type)
    }
}
