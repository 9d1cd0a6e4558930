//! Structured logging configuration.

use crate::config::ConfigFileLogging;
use std::path::PathBuf;
use std::str::FromStr;

/// Filter used when nothing else is configured.
const DEFAULT_FILTER: &str = "gitkv=warn";

/// Filter used when verbose or debug output is requested.
const VERBOSE_FILTER: &str = "gitkv=debug";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directive.
    pub filter: String,
    /// Append events to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: DEFAULT_FILTER.to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Builds logging configuration from the config file section and the
    /// process environment.
    #[must_use]
    pub fn from_settings(settings: Option<&ConfigFileLogging>, verbose: bool) -> Self {
        Self::from_settings_with(settings, verbose, |key| std::env::var(key).ok())
    }

    /// Builds logging configuration, resolving environment variables through
    /// `lookup`.
    ///
    /// Precedence for the filter: `RUST_LOG`, then the verbose flag, then the
    /// config file, then `gitkv=warn`. `GITKV_LOG_FORMAT` and `GITKV_LOG_FILE`
    /// override the file's format and path.
    #[must_use]
    pub fn from_settings_with(
        settings: Option<&ConfigFileLogging>,
        verbose: bool,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut config = Self::default();

        if let Some(settings) = settings {
            if let Some(format) = settings.format.as_deref() {
                match format.parse() {
                    Ok(format) => config.format = format,
                    Err(e) => tracing::warn!("Ignoring logging.format: {e}"),
                }
            }
            if let Some(filter) = &settings.filter {
                config.filter.clone_from(filter);
            }
            config.file.clone_from(&settings.file);
        }

        if verbose {
            config.filter = VERBOSE_FILTER.to_string();
        }
        if let Some(filter) = lookup("RUST_LOG").filter(|f| !f.trim().is_empty()) {
            config.filter = filter;
        }
        if let Some(format) = lookup("GITKV_LOG_FORMAT").and_then(|f| f.parse().ok()) {
            config.format = format;
        }
        if let Some(file) = lookup("GITKV_LOG_FILE").filter(|f| !f.trim().is_empty()) {
            config.file = Some(PathBuf::from(file));
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoggingConfig::from_settings_with(None, false, |_| None);
        assert_eq!(config, LoggingConfig::default());
        assert_eq!(config.filter, "gitkv=warn");
    }

    #[test]
    fn test_verbose_raises_filter() {
        let config = LoggingConfig::from_settings_with(None, true, |_| None);
        assert_eq!(config.filter, "gitkv=debug");
    }

    #[test]
    fn test_settings_then_env_precedence() {
        let settings = ConfigFileLogging {
            format: Some("json".to_string()),
            filter: Some("gitkv=info".to_string()),
            file: Some(PathBuf::from("/tmp/gitkv.log")),
        };

        let config = LoggingConfig::from_settings_with(Some(&settings), false, |_| None);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter, "gitkv=info");
        assert_eq!(config.file, Some(PathBuf::from("/tmp/gitkv.log")));

        let config = LoggingConfig::from_settings_with(Some(&settings), true, |key| match key {
            "RUST_LOG" => Some("trace".to_string()),
            "GITKV_LOG_FORMAT" => Some("pretty".to_string()),
            _ => None,
        });
        assert_eq!(config.filter, "trace");
        assert_eq!(config.format, LogFormat::Pretty);
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
