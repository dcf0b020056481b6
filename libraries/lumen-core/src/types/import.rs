//! Imports and their settings
//!
//! An import is the configured intent to synchronize one media type from one
//! path of a source. `(path, media_type)` uniquely identifies an import.

use crate::error::Result;
use crate::types::{MediaType, Source};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What starts a synchronization of an import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImportTrigger {
    /// Synchronized whenever the source is (re)discovered or a full import runs
    #[default]
    Auto,
    /// Only synchronized when explicitly requested
    Manual,
}

impl ImportTrigger {
    /// Convert to string for storage
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }

    /// Parse from string
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(Self::Auto),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for ImportTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-import synchronization settings
///
/// Persisted as a small JSON document:
///
/// ```json
/// {"importTrigger":"auto","updateImportedItems":true,
///  "updatePlaybackMetadataFromSource":true,"updatePlaybackMetadataOnSource":true}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportSettings {
    /// When the import is synchronized
    pub import_trigger: ImportTrigger,

    /// Whether changed items on the source update already imported items
    pub update_imported_items: bool,

    /// Whether play count, last played and resume position are taken from the source
    pub update_playback_metadata_from_source: bool,

    /// Whether local playback changes are pushed back to the source
    pub update_playback_metadata_on_source: bool,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            import_trigger: ImportTrigger::Auto,
            update_imported_items: true,
            update_playback_metadata_from_source: true,
            update_playback_metadata_on_source: true,
        }
    }
}

impl ImportSettings {
    /// Serialize the settings into their persisted document form
    pub fn to_document(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse settings from their persisted document form.
    ///
    /// Keys missing from the document keep their default value.
    pub fn from_document(document: &str) -> Result<Self> {
        if document.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(document)?)
    }
}

/// Unique key of an import
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportKey {
    /// Path on the source
    pub path: String,
    /// Imported media type
    pub media_type: MediaType,
}

impl ImportKey {
    /// Create an import key
    pub fn new(path: impl Into<String>, media_type: impl Into<MediaType>) -> Self {
        Self {
            path: path.into(),
            media_type: media_type.into(),
        }
    }
}

impl fmt::Display for ImportKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.path, self.media_type)
    }
}

/// A configured import of one media type from one source path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Import {
    /// Path on the source to import from
    pub path: String,

    /// Imported media type
    pub media_type: MediaType,

    /// Snapshot of the owning source
    pub source: Source,

    /// Synchronization settings
    #[serde(default)]
    pub settings: ImportSettings,

    /// Last successful synchronization
    #[serde(default)]
    pub last_synced: Option<DateTime<Utc>>,

    /// Derived from the owning source
    #[serde(default)]
    pub active: bool,
}

impl Import {
    /// Create an import with default settings
    pub fn new(path: impl Into<String>, media_type: impl Into<MediaType>, source: Source) -> Self {
        let active = source.active;
        Self {
            path: path.into(),
            media_type: media_type.into(),
            source,
            settings: ImportSettings::default(),
            last_synced: None,
            active,
        }
    }

    /// Replace the settings
    pub fn with_settings(mut self, settings: ImportSettings) -> Self {
        self.settings = settings;
        self
    }

    /// The unique key of this import
    pub fn key(&self) -> ImportKey {
        ImportKey::new(self.path.clone(), self.media_type.clone())
    }

    /// Identifier of the owning source
    pub fn source_id(&self) -> &str {
        &self.source.identifier
    }

    /// Whether this import has the given key
    pub fn matches(&self, path: &str, media_type: &MediaType) -> bool {
        self.path == path && &self.media_type == media_type
    }

    /// Refresh the source snapshot, deriving `active` from it
    pub fn set_source(&mut self, source: Source) {
        self.active = source.active;
        self.source = source;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_round_trip_non_default() {
        let settings = ImportSettings {
            import_trigger: ImportTrigger::Manual,
            update_imported_items: false,
            update_playback_metadata_from_source: false,
            update_playback_metadata_on_source: false,
        };

        let document = settings.to_document().unwrap();
        let parsed = ImportSettings::from_document(&document).unwrap();

        assert_eq!(parsed.import_trigger, ImportTrigger::Manual);
        assert!(!parsed.update_imported_items);
        assert!(!parsed.update_playback_metadata_from_source);
        assert!(!parsed.update_playback_metadata_on_source);
        assert_eq!(parsed, settings);
    }

    #[test]
    fn test_settings_document_keys() {
        let document = ImportSettings::default().to_document().unwrap();

        assert!(document.contains("\"importTrigger\":\"auto\""));
        assert!(document.contains("\"updateImportedItems\":true"));
        assert!(document.contains("\"updatePlaybackMetadataFromSource\":true"));
        assert!(document.contains("\"updatePlaybackMetadataOnSource\":true"));
    }

    #[test]
    fn test_settings_missing_keys_use_defaults() {
        let parsed = ImportSettings::from_document(r#"{"importTrigger":"manual"}"#).unwrap();

        assert_eq!(parsed.import_trigger, ImportTrigger::Manual);
        assert!(parsed.update_imported_items);

        assert_eq!(ImportSettings::from_document("").unwrap(), ImportSettings::default());
    }

    #[test]
    fn test_settings_reject_garbage() {
        assert!(ImportSettings::from_document("<settings/>").is_err());
    }

    #[test]
    fn test_import_active_follows_source() {
        let source = Source::new("upnp://server", "Server").with_active(true);
        let mut import = Import::new("upnp://server/videos", "movie", source.clone());
        assert!(import.active);

        import.set_source(source.with_active(false));
        assert!(!import.active);
        assert!(!import.source.active);
    }

    #[test]
    fn test_trigger_string_conversion() {
        assert_eq!(ImportTrigger::from_str("manual"), Some(ImportTrigger::Manual));
        assert_eq!(ImportTrigger::from_str(ImportTrigger::Auto.as_str()), Some(ImportTrigger::Auto));
        assert_eq!(ImportTrigger::from_str("sometimes"), None);
    }
}
