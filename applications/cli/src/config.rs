/// CLI configuration
use crate::error::{CliError, Result};
use lumen_sync::SyncConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "lumen.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CliConfig {
    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageSettings {
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
        }
    }
}

impl CliConfig {
    /// Load configuration from file and environment.
    ///
    /// An explicit `path` must exist; without one `lumen.toml` is read when
    /// present. `LUMEN_*` environment variables override file values, with
    /// `__` separating sections (`LUMEN_SYNC__MAX_CONCURRENT_JOBS=4`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(CliError::Config(format!(
                        "config file {} not found",
                        path.display()
                    )));
                }
                settings = settings.add_source(config::File::from(path.to_path_buf()));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    settings = settings.add_source(config::File::from(default_path));
                }
            }
        }

        // Override with environment variables (prefixed with LUMEN_)
        settings = settings.add_source(
            config::Environment::with_prefix("LUMEN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = settings.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML document
    pub fn from_toml(document: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(document).map_err(|e| CliError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.storage.database_url.is_empty() {
            return Err(CliError::Config(
                "database URL is required (set LUMEN_STORAGE__DATABASE_URL)".to_string(),
            ));
        }
        self.sync.validate().map_err(CliError::Config)
    }
}

fn default_database_url() -> String {
    "sqlite://./lumen.db".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = CliConfig::from_toml("").unwrap();
        assert_eq!(config.storage.database_url, "sqlite://./lumen.db");
        assert_eq!(config.sync.max_concurrent_jobs, 2);
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = CliConfig::from_toml(
            r#"
            [storage]
            database_url = "sqlite:///var/lib/lumen/lumen.db"

            [sync]
            max_concurrent_jobs = 4
            auto_add_imports = false

            [sync.default_settings]
            importTrigger = "manual"
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.database_url, "sqlite:///var/lib/lumen/lumen.db");
        assert_eq!(config.sync.max_concurrent_jobs, 4);
        assert!(!config.sync.auto_add_imports);
        assert_eq!(
            config.sync.default_settings.import_trigger,
            lumen_core::ImportTrigger::Manual
        );
        assert!(config.sync.default_settings.update_imported_items);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(CliConfig::from_toml("[sync]\nmax_concurrent_jobs = 0").is_err());
        assert!(CliConfig::from_toml("[storage]\ndatabase_url = \"\"").is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = CliConfig::load(Some(Path::new("/nonexistent/lumen.toml")));
        assert!(matches!(result, Err(CliError::Config(_))));
    }
}
