//! Configuration management.
//!
//! Configuration is layered: built-in defaults, then a TOML file (explicit
//! path or the platform config dir), then `.env`, then environment
//! variables.

mod training;

pub use training::TrainingConfig;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::storage::SqliteCourseBackend;
use crate::{Error, Result};

/// Environment variable overriding the database path.
pub const ENV_DATABASE: &str = "COHORTCACHE_DB";
/// Environment variable overriding the legacy training cutover.
pub const ENV_LEGACY_CUTOVER: &str = "COHORTCACHE_LEGACY_CUTOVER";
/// Environment variable overriding the roster directory.
pub const ENV_ROSTER_DIR: &str = "COHORTCACHE_ROSTER_DIR";

/// Main configuration for cohortcache.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CohortCacheConfig {
    /// `SQLite` database file. Falls back to the platform data dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    /// Training evaluation settings.
    pub training: TrainingConfig,
    /// Logging settings; environment overrides are applied at init.
    pub logging: LoggingSettings,
    /// Metrics settings.
    pub metrics: MetricsSettings,
    /// Roster source settings.
    pub roster: RosterSettings,
    /// File the configuration was read from, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// `[logging]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Filter directive, e.g. `info` or `cohortcache=debug`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// `pretty` or `json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Append logs to this file instead of stderr.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// `[metrics]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Install the Prometheus recorder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Serve metrics over HTTP on this port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// `[roster]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RosterSettings {
    /// Directory holding `<course-slug>.json` roster snapshots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Database path.
    pub database_path: Option<String>,
    /// Training section.
    pub training: Option<ConfigFileTraining>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
    /// Metrics section.
    pub metrics: Option<MetricsSettings>,
    /// Roster section.
    pub roster: Option<RosterSettings>,
}

/// Training section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileTraining {
    /// Cutover date as `YYYY-MM-DD`.
    pub legacy_cutover: Option<String>,
}

impl CohortCacheConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration the way the binary does.
    ///
    /// Reads `.env` if present, then `explicit` (which must exist) or the
    /// default location, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file cannot be read or parsed, or an
    /// override is malformed.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        // a missing .env is not an error
        let _ = dotenvy::dotenv();

        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load_default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        let file: ConfigFile = toml::from_str(&contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        let mut config = Self::from_config_file(file)?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks `<config dir>/cohortcache/config.toml`, then
    /// `~/.config/cohortcache/config.toml`. Returns defaults if neither
    /// exists or parses.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let candidates = [
            base_dirs.config_dir().join("cohortcache").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("cohortcache")
                .join("config.toml"),
        ];
        for path in candidates.iter().filter(|p| p.exists()) {
            match Self::load_from_file(path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                },
            }
        }

        Self::default()
    }

    /// Converts a `ConfigFile` to `CohortCacheConfig`.
    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = file.database_path {
            config.database_path = Some(PathBuf::from(path));
        }
        if let Some(cutover) = file.training.and_then(|t| t.legacy_cutover) {
            config.training.legacy_cutover = TrainingConfig::parse_cutover(&cutover)?;
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }
        if let Some(metrics) = file.metrics {
            config.metrics = metrics;
        }
        if let Some(roster) = file.roster {
            config.roster = roster;
        }

        Ok(config)
    }

    /// Applies overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if an override value is malformed.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides read through `lookup`. Empty values are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if an override value is malformed.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = get(ENV_DATABASE) {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(cutover) = get(ENV_LEGACY_CUTOVER) {
            self.training.legacy_cutover = TrainingConfig::parse_cutover(&cutover)?;
        }
        if let Some(dir) = get(ENV_ROSTER_DIR) {
            self.roster.directory = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    /// Returns the database path to open.
    ///
    /// # Errors
    ///
    /// Returns an error if no path is configured and the platform data dir
    /// cannot be determined.
    pub fn resolved_database_path(&self) -> Result<PathBuf> {
        self.database_path
            .clone()
            .or_else(SqliteCourseBackend::default_path)
            .ok_or_else(|| Error::OperationFailed {
                operation: "resolve_database_path".to_string(),
                cause: format!("set database_path or {ENV_DATABASE}"),
            })
    }

    /// Sets the database path.
    #[must_use]
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Renders the effective configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::OperationFailed {
            operation: "render_config".to_string(),
            cause: e.to_string(),
        })
    }
}
