//! Configuration file loading and data folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "DOUBLEPLAY_CONFIG";

/// Environment variable naming the data folder
pub const DATA_FOLDER_ENV: &str = "DOUBLEPLAY_DATA_FOLDER";

/// Settings as written in the TOML file.
///
/// Every key is optional; missing keys fall through to environment
/// variables and compiled defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub data_folder: Option<PathBuf>,
    pub dataset_file: Option<String>,
    pub backup_folder: Option<PathBuf>,
    pub api_base_url: Option<String>,
    pub page_size: Option<u32>,
    pub max_pages: Option<u32>,
    pub requests_per_second: Option<u32>,
    pub max_fetch_attempts: Option<u32>,
    pub max_chunk_minutes: Option<i64>,
    pub forward_interval_secs: Option<u64>,
    pub boundary_lookahead_minutes: Option<i64>,
    /// RFC 3339 floor for backward scanning
    pub history_stop_date: Option<String>,
    pub health_port: Option<u16>,
    pub log_level: Option<String>,
    pub fail_on_save_error: Option<bool>,
}

/// Locate the config file.
///
/// Priority:
/// 1. Explicit path (command line)
/// 2. `DOUBLEPLAY_CONFIG` environment variable
/// 3. `<config_dir>/doubleplay/config.toml` if it exists
///
/// Returns `None` when no file applies; an explicit path is returned even if
/// missing so the caller reports it.
pub fn locate_config_file(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir()
        .map(|d| d.join("doubleplay").join("config.toml"))
        .filter(|p| p.exists())
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load the config file if one applies, otherwise all-default settings
pub fn load_or_default(cli_path: Option<&Path>) -> Result<TomlConfig> {
    match locate_config_file(cli_path) {
        Some(path) => {
            let config = load_toml_config(&path)?;
            tracing::info!(path = %path.display(), "Loaded configuration file");
            Ok(config)
        }
        None => {
            tracing::debug!("No configuration file found, using defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Data folder resolution:
/// 1. Command-line argument
/// 2. `DOUBLEPLAY_DATA_FOLDER` environment variable
/// 3. TOML `data_folder`
/// 4. OS-dependent default
pub fn resolve_data_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(DATA_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.data_folder {
        return path.clone();
    }

    default_data_folder()
}

/// OS-dependent default data folder
pub fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("doubleplay"))
        .unwrap_or_else(|| PathBuf::from("./doubleplay_data"))
}

/// User-Agent sent to the upstream API
pub fn user_agent() -> String {
    format!(
        "doubleplay-tracker/{} (+https://github.com/doubleplay-tracker)",
        env!("CARGO_PKG_VERSION")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_data_folder_is_not_empty() {
        assert!(!default_data_folder().as_os_str().is_empty());
    }

    #[test]
    fn test_user_agent_carries_version() {
        assert!(user_agent().contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_cli_path_wins() {
        let path = Path::new("/tmp/explicit.toml");
        assert_eq!(locate_config_file(Some(path)), Some(path.to_path_buf()));
    }

    #[test]
    fn test_empty_toml_parses_to_defaults() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
    }
}
