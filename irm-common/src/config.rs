//! Configuration loading and settings resolution
//!
//! Every runtime setting resolves in the same priority order:
//! 1. Environment variable (highest priority)
//! 2. TOML config file
//! 3. Compiled default (fallback)
//!
//! The config file itself is located by command-line argument, then
//! environment variable, then the OS-dependent user config directory.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Bootstrap configuration loaded from TOML file
///
/// All fields are optional so that a partial file (or no file at all)
/// still yields a usable configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// HTTP listen port
    #[serde(default)]
    pub port: Option<u16>,

    /// Additional allowed CORS origin for a deployed frontend
    #[serde(default)]
    pub frontend_url: Option<String>,

    /// Directory holding the forecast workbook and bundled transcript
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Base URL of the JSON web search backend
    #[serde(default)]
    pub search_url: Option<String>,

    /// Model identifier passed to the drafting backend
    #[serde(default)]
    pub drafting_model: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub api_keys: ApiKeysConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Transport timeouts for outbound leaf calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_http_timeout_secs")]
    pub http_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            http_secs: default_http_timeout_secs(),
        }
    }
}

/// API keys for external collaborators
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeysConfig {
    #[serde(default)]
    pub anthropic: Option<String>,
    #[serde(default)]
    pub fmp: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_http_timeout_secs() -> u64 {
    15
}

/// Locate the config file
///
/// Priority: command-line argument, then `env_var_name`, then
/// `<user config dir>/irm/<file_name>` if it exists. Returns `None` when no
/// candidate applies, which callers treat as "use defaults".
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    file_name: &str,
) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir()
        .map(|d| d.join("irm").join(file_name))
        .filter(|p| p.exists())
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Load the config file if one was located, otherwise return defaults
pub fn load_or_default(path: Option<&Path>) -> Result<TomlConfig> {
    match path {
        Some(path) => load_toml_config(path),
        None => {
            info!("No config file found, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Resolve a single setting: ENV -> TOML -> default
///
/// An environment value that fails to parse is ignored with a warning.
pub fn resolve_setting<T>(env_var: &str, toml_value: Option<T>, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    if let Ok(raw) = std::env::var(env_var) {
        match raw.trim().parse::<T>() {
            Ok(value) => {
                debug!("{} loaded from environment: {:?}", env_var, value);
                return value;
            }
            Err(_) => warn!("Ignoring unparsable {}={:?}", env_var, raw),
        }
    }

    if let Some(value) = toml_value {
        debug!("{} loaded from TOML: {:?}", env_var, value);
        return value;
    }

    default
}

/// Resolve an optional secret: ENV -> TOML
///
/// Warns when both sources carry a value (potential misconfiguration).
pub fn resolve_secret(env_var: &str, toml_value: Option<&String>) -> Option<String> {
    let env_key = std::env::var(env_var).ok().filter(|k| is_valid_key(k));
    let toml_key = toml_value.filter(|k| is_valid_key(k)).cloned();

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "{} found in both environment and TOML. Using environment (highest priority).",
            env_var
        );
    }

    match (env_key, toml_key) {
        (Some(key), _) => {
            info!("{} loaded from environment variable", env_var);
            Some(key)
        }
        (None, Some(key)) => {
            info!("{} loaded from TOML config", env_var);
            Some(key)
        }
        (None, None) => None,
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_partial_toml_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 8100\n[api_keys]\nfmp = \"abc\"").unwrap();

        let config = load_toml_config(file.path()).unwrap();
        assert_eq!(config.port, Some(8100));
        assert_eq!(config.api_keys.fmp.as_deref(), Some("abc"));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.timeouts.http_secs, 15);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = \"not a number").unwrap();

        let err = load_toml_config(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_path_uses_defaults() {
        let config = load_or_default(None).unwrap();
        assert!(config.port.is_none());
        assert!(config.api_keys.anthropic.is_none());
    }

    #[test]
    #[serial]
    fn test_env_overrides_toml() {
        std::env::set_var("IRM_TEST_PORT", "9001");
        assert_eq!(resolve_setting("IRM_TEST_PORT", Some(8000u16), 5000), 9001);
        std::env::remove_var("IRM_TEST_PORT");
        assert_eq!(resolve_setting("IRM_TEST_PORT", Some(8000u16), 5000), 8000);
        assert_eq!(resolve_setting::<u16>("IRM_TEST_PORT", None, 5000), 5000);
    }

    #[test]
    #[serial]
    fn test_unparsable_env_falls_through() {
        std::env::set_var("IRM_TEST_TIMEOUT", "soon");
        assert_eq!(resolve_setting("IRM_TEST_TIMEOUT", Some(20u64), 15), 20);
        std::env::remove_var("IRM_TEST_TIMEOUT");
    }

    #[test]
    #[serial]
    fn test_secret_resolution_priority() {
        let toml_key = "from-toml".to_string();
        std::env::remove_var("IRM_TEST_KEY");
        assert_eq!(
            resolve_secret("IRM_TEST_KEY", Some(&toml_key)).as_deref(),
            Some("from-toml")
        );

        std::env::set_var("IRM_TEST_KEY", "from-env");
        assert_eq!(
            resolve_secret("IRM_TEST_KEY", Some(&toml_key)).as_deref(),
            Some("from-env")
        );

        std::env::set_var("IRM_TEST_KEY", "   ");
        assert_eq!(resolve_secret("IRM_TEST_KEY", None), None);
        std::env::remove_var("IRM_TEST_KEY");
    }

    #[test]
    fn test_cli_path_wins() {
        let path = PathBuf::from("/tmp/explicit.toml");
        assert_eq!(
            resolve_config_path(Some(&path), "IRM_UNSET_CONFIG_VAR", "irm-memo.toml"),
            Some(path)
        );
    }
}
