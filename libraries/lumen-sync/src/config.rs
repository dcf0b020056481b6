//! Engine configuration

use lumen_core::ImportSettings;
use serde::{Deserialize, Serialize};

/// Configuration of the import manager
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Maximum number of jobs (distinct sources/paths) running at once
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Create imports for every supported media type of a newly registered source
    #[serde(default = "default_true")]
    pub auto_add_imports: bool,

    /// Synchronize automatic imports whenever their source is registered
    #[serde(default = "default_true")]
    pub sync_on_register: bool,

    /// Capacity of the event and progress broadcast channels
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Settings given to imports created without explicit settings
    #[serde(default)]
    pub default_settings: ImportSettings,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            auto_add_imports: true,
            sync_on_register: true,
            event_capacity: default_event_capacity(),
            default_settings: ImportSettings::default(),
        }
    }
}

impl SyncConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_jobs == 0 {
            return Err("max_concurrent_jobs must be at least 1".to_string());
        }
        if self.event_capacity == 0 {
            return Err("event_capacity must be at least 1".to_string());
        }
        Ok(())
    }
}

fn default_max_concurrent_jobs() -> usize {
    2
}

fn default_true() -> bool {
    true
}

fn default_event_capacity() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_concurrent_jobs, 2);
        assert!(config.auto_add_imports);
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let config: SyncConfig = serde_json::from_str(r#"{"max_concurrent_jobs": 4}"#).unwrap();
        assert_eq!(config.max_concurrent_jobs, 4);
        assert!(config.sync_on_register);
        assert_eq!(config.event_capacity, 256);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = SyncConfig {
            max_concurrent_jobs: 0,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
