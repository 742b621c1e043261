// src/config.rs

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::orchestrator::OrchestratorSettings;

const APP_DIR: &str = "flacfetch";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid setting `{0}`: must be greater than zero")]
    Zero(&'static str),
}

/// Application settings. Every field has a default, so a config file only
/// needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Where downloads land when a request does not name a directory.
    pub output_dir: PathBuf,
    pub history_db: PathBuf,
    pub history_namespace: String,
    pub metadata_timeout_secs: u64,
    /// Upper bound on concurrent stat calls in a batch existence check.
    pub batch_concurrency: usize,
    /// Tidal API mirrors, tried in order. Empty uses the provider's own list.
    pub tidal_mirrors: Vec<String>,
    pub http_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let output_dir = dirs::audio_dir()
            .or_else(dirs::home_dir)
            .map(|dir| dir.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("."));
        let history_db = dirs::data_dir()
            .map(|dir| dir.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("history.db");

        Self {
            output_dir,
            history_db,
            history_namespace: APP_DIR.to_string(),
            metadata_timeout_secs: 10,
            batch_concurrency: 16,
            tidal_mirrors: Vec::new(),
            http_timeout_secs: 30,
        }
    }
}

impl Settings {
    /// `<config dir>/flacfetch/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads `path` if given, else the default location. A missing default
    /// file yields the defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => {
                debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.metadata_timeout_secs == 0 {
            return Err(ConfigError::Zero("metadata_timeout_secs"));
        }
        if self.batch_concurrency == 0 {
            return Err(ConfigError::Zero("batch_concurrency"));
        }
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::Zero("http_timeout_secs"));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            metadata_timeout: Duration::from_secs(self.metadata_timeout_secs),
            tidal_mirrors: self.tidal_mirrors.clone(),
            history_namespace: self.history_namespace.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "batch_concurrency = 4\ntidal_mirrors = [\"https://a\", \"https://b\"]\n",
        )
        .unwrap();

        let settings = Settings::load(Some(path.as_path())).unwrap();
        assert_eq!(settings.batch_concurrency, 4);
        assert_eq!(settings.tidal_mirrors, vec!["https://a", "https://b"]);
        assert_eq!(settings.metadata_timeout_secs, 10);
        assert_eq!(settings.history_namespace, "flacfetch");

        let orchestrator = settings.orchestrator_settings();
        assert_eq!(orchestrator.metadata_timeout, Duration::from_secs(10));
        assert_eq!(orchestrator.tidal_mirrors.len(), 2);
    }

    #[test]
    fn zero_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "http_timeout_secs = 0\n").unwrap();
        assert!(matches!(
            Settings::load(Some(path.as_path())),
            Err(ConfigError::Zero("http_timeout_secs"))
        ));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(Some(dir.path().join("absent.toml").as_path())).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "batch_concurrency = \"many\"\n").unwrap();
        assert!(matches!(Settings::load(Some(path.as_path())), Err(ConfigError::Parse { .. })));
    }
}
