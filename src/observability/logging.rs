//! Structured logging configuration.

use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;

/// Environment variable holding the filter directive.
pub const ENV_LOG: &str = "COHORTCACHE_LOG";
/// Environment variable selecting the output format.
pub const ENV_LOG_FORMAT: &str = "COHORTCACHE_LOG_FORMAT";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name; anything other than `json` is pretty.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Event filter.
    pub filter: EnvFilter,
    /// The directive the filter was built from.
    pub directive: String,
    /// Output format.
    pub format: LogFormat,
    /// Optional log file; stderr when `None`.
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Builds logging configuration from config settings with env overrides.
    ///
    /// Precedence for the directive: `COHORTCACHE_LOG`, then `--verbose`
    /// (`debug`), then the configured level, then `warn`.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        Self::from_lookup(settings, verbose, |key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_settings`] with an explicit environment.
    #[must_use]
    pub fn from_lookup(
        settings: Option<&LoggingSettings>,
        verbose: bool,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let env_directive = lookup(ENV_LOG).filter(|v| !v.trim().is_empty());
        let configured = settings.and_then(|s| s.level.clone());
        let directive = env_directive
            .or_else(|| verbose.then(|| "debug".to_string()))
            .or(configured)
            .unwrap_or_else(|| "warn".to_string());

        let filter = EnvFilter::try_new(&directive).unwrap_or_else(|e| {
            eprintln!("Invalid log directive '{directive}' ({e}); using 'warn'");
            EnvFilter::new("warn")
        });

        let format = lookup(ENV_LOG_FORMAT)
            .or_else(|| settings.and_then(|s| s.format.clone()))
            .map_or(LogFormat::Pretty, |f| LogFormat::parse(&f));

        Self {
            filter,
            directive,
            format,
            file: settings.and_then(|s| s.file.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_to_warn_pretty() {
        let config = LoggingConfig::from_lookup(None, false, no_env);
        assert_eq!(config.directive, "warn");
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.file.is_none());
    }

    #[test]
    fn test_verbose_beats_configured_level() {
        let settings = LoggingSettings {
            level: Some("info".to_string()),
            format: Some("json".to_string()),
            file: None,
        };
        let config = LoggingConfig::from_lookup(Some(&settings), true, no_env);
        assert_eq!(config.directive, "debug");
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_env_beats_everything() {
        let settings = LoggingSettings {
            level: Some("info".to_string()),
            format: Some("json".to_string()),
            file: None,
        };
        let config = LoggingConfig::from_lookup(Some(&settings), true, |key| match key {
            ENV_LOG => Some("cohortcache=trace".to_string()),
            ENV_LOG_FORMAT => Some("pretty".to_string()),
            _ => None,
        });
        assert_eq!(config.directive, "cohortcache=trace");
        assert_eq!(config.format, LogFormat::Pretty);
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("text"), LogFormat::Pretty);
    }
}
