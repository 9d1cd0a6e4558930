//! TOML configuration file.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Configuration file contents.
///
/// Every field is optional; absent fields keep the builder default.
///
/// ```toml
/// host = "git@github.com:octocat/kv-data.git"
/// token = "ghp_..."
/// db = "sessions"
/// branch = "main"
/// cache = true
///
/// [committer]
/// name = "kv bot"
/// email = "kv@example.com"
///
/// [http]
/// timeout_ms = 10000
///
/// [logging]
/// format = "json"
/// filter = "gitkv=debug"
/// ```
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Connection string (clone link).
    pub host: Option<String>,
    /// Access token.
    pub token: Option<String>,
    /// Initial namespace.
    pub db: Option<String>,
    /// Branch.
    pub branch: Option<String>,
    /// Cipher secret.
    pub secret: Option<String>,
    /// Debug logging.
    pub debug: Option<bool>,
    /// Read and listing caches.
    pub cache: Option<bool>,
    /// API base URL override.
    pub api_base_url: Option<String>,
    /// Committer identity.
    pub committer: Option<ConfigFileCommitter>,
    /// HTTP client settings.
    pub http: Option<ConfigFileHttp>,
    /// Logging settings.
    pub logging: Option<ConfigFileLogging>,
}

/// `[committer]` section.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileCommitter {
    /// Committer name.
    pub name: Option<String>,
    /// Committer email.
    pub email: Option<String>,
}

/// `[http]` section.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileHttp {
    /// Request timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
}

/// `[logging]` section.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileLogging {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// `EnvFilter` directive.
    pub filter: Option<String>,
    /// Log file path.
    pub file: Option<PathBuf>,
}

impl ConfigFile {
    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: e.to_string(),
        })?;

        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!("invalid config file {}: {e}", path.display()))
        })
    }

    /// Loads the first config file found in the default locations.
    ///
    /// Checks the platform config dir, then `~/.config/gitkv/config.toml`.
    /// Returns `Ok(None)` when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a file exists but cannot be read or parsed.
    pub fn load_default() -> Result<Option<Self>> {
        for path in Self::default_paths() {
            if path.exists() {
                return Self::load_from_file(&path).map(Some);
            }
        }
        Ok(None)
    }

    /// Candidate config file locations, in lookup order.
    #[must_use]
    pub fn default_paths() -> Vec<PathBuf> {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Vec::new();
        };

        let platform_config = base_dirs.config_dir().join("gitkv").join("config.toml");
        let xdg_config = base_dirs
            .home_dir()
            .join(".config")
            .join("gitkv")
            .join("config.toml");

        if platform_config == xdg_config {
            vec![platform_config]
        } else {
            vec![platform_config, xdg_config]
        }
    }
}
