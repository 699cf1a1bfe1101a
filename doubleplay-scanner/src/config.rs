//! Configuration resolution for doubleplay-scanner
//!
//! Priority: command line (with `DOUBLEPLAY_*` environment fallbacks, handled
//! by clap) → TOML file → compiled defaults.

use chrono::{DateTime, Duration, Utc};
use doubleplay_common::config::{resolve_data_folder, user_agent, TomlConfig};
use doubleplay_common::{Error, Result};
use std::path::PathBuf;

pub const DEFAULT_API_BASE_URL: &str = "https://api.kexp.org/v2";
pub const DEFAULT_DATASET_FILE: &str = "double_plays.json";
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_MAX_PAGES: u32 = 50;
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 2;
pub const DEFAULT_MAX_FETCH_ATTEMPTS: u32 = 4;
pub const DEFAULT_MAX_CHUNK_MINUTES: i64 = 60;
pub const DEFAULT_FORWARD_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_BOUNDARY_LOOKAHEAD_MINUTES: i64 = 10;
pub const DEFAULT_HISTORY_DAYS: i64 = 365;
pub const DEFAULT_HEALTH_PORT: u16 = 5790;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Upstream client settings
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub user_agent: String,
    pub page_size: u32,
    /// Hard cap on pages followed per fetch
    pub max_pages: u32,
    pub requests_per_second: u32,
    /// Attempts per HTTP request, including the first
    pub max_fetch_attempts: u32,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            user_agent: user_agent(),
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            max_fetch_attempts: DEFAULT_MAX_FETCH_ATTEMPTS,
        }
    }
}

/// Scan queue settings
#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// Largest span fetched per chunk
    pub max_chunk: Duration,
    /// Period of the forward trigger
    pub forward_interval: std::time::Duration,
    /// Extra window fetched to find the end of a window's last play
    pub boundary_lookahead: Duration,
    /// Backward scanning floor; `None` means one year before start-up
    pub history_stop_date: Option<DateTime<Utc>>,
    /// Scan history only; no forward jobs
    pub backward_only: bool,
    /// Bubble save failures out of the chunk instead of only logging them
    pub fail_on_save_error: bool,
}

impl ScanSettings {
    /// Historical floor relative to `now`
    pub fn history_floor(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.history_stop_date
            .unwrap_or_else(|| now - Duration::days(DEFAULT_HISTORY_DAYS))
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            max_chunk: Duration::minutes(DEFAULT_MAX_CHUNK_MINUTES),
            forward_interval: std::time::Duration::from_secs(DEFAULT_FORWARD_INTERVAL_SECS),
            boundary_lookahead: Duration::minutes(DEFAULT_BOUNDARY_LOOKAHEAD_MINUTES),
            history_stop_date: None,
            backward_only: false,
            fail_on_save_error: false,
        }
    }
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub data_folder: Option<PathBuf>,
    pub api_base_url: Option<String>,
    pub history_stop_date: Option<String>,
    pub health_port: Option<u16>,
    pub backward_only: bool,
}

/// Fully resolved configuration
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub data_folder: PathBuf,
    pub dataset_path: PathBuf,
    pub backup_folder: Option<PathBuf>,
    pub client: ClientSettings,
    pub scan: ScanSettings,
    /// 0 disables the health surface
    pub health_port: u16,
    pub log_level: String,
}

impl ScannerConfig {
    /// Merge overrides, TOML and defaults, then validate
    pub fn resolve(toml_config: &TomlConfig, overrides: ConfigOverrides) -> Result<Self> {
        let data_folder = resolve_data_folder(overrides.data_folder.as_deref(), toml_config);
        let dataset_file = toml_config
            .dataset_file
            .clone()
            .unwrap_or_else(|| DEFAULT_DATASET_FILE.to_string());
        let dataset_path = data_folder.join(dataset_file);

        let client = ClientSettings {
            base_url: overrides
                .api_base_url
                .or_else(|| toml_config.api_base_url.clone())
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            user_agent: user_agent(),
            page_size: toml_config.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            max_pages: toml_config.max_pages.unwrap_or(DEFAULT_MAX_PAGES),
            requests_per_second: toml_config
                .requests_per_second
                .unwrap_or(DEFAULT_REQUESTS_PER_SECOND),
            max_fetch_attempts: toml_config
                .max_fetch_attempts
                .unwrap_or(DEFAULT_MAX_FETCH_ATTEMPTS),
        };

        let stop_date = overrides
            .history_stop_date
            .or_else(|| toml_config.history_stop_date.clone());
        let history_stop_date = match stop_date {
            Some(raw) => Some(
                doubleplay_common::time::parse_instant(&raw)
                    .map_err(|e| Error::Config(format!("history_stop_date: {}", e)))?,
            ),
            None => None,
        };

        let scan = ScanSettings {
            max_chunk: Duration::minutes(
                toml_config
                    .max_chunk_minutes
                    .unwrap_or(DEFAULT_MAX_CHUNK_MINUTES),
            ),
            forward_interval: std::time::Duration::from_secs(
                toml_config
                    .forward_interval_secs
                    .unwrap_or(DEFAULT_FORWARD_INTERVAL_SECS),
            ),
            boundary_lookahead: Duration::minutes(
                toml_config
                    .boundary_lookahead_minutes
                    .unwrap_or(DEFAULT_BOUNDARY_LOOKAHEAD_MINUTES),
            ),
            history_stop_date,
            backward_only: overrides.backward_only,
            fail_on_save_error: toml_config.fail_on_save_error.unwrap_or(false),
        };

        let config = Self {
            data_folder,
            dataset_path,
            backup_folder: toml_config.backup_folder.clone(),
            client,
            scan,
            health_port: overrides
                .health_port
                .or(toml_config.health_port)
                .unwrap_or(DEFAULT_HEALTH_PORT),
            log_level: toml_config
                .log_level
                .clone()
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the queue cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.scan.max_chunk <= Duration::zero() {
            return Err(Error::Config("max_chunk_minutes must be > 0".to_string()));
        }
        if self.scan.forward_interval.is_zero() {
            return Err(Error::Config("forward_interval_secs must be > 0".to_string()));
        }
        if self.scan.boundary_lookahead < Duration::zero() {
            return Err(Error::Config(
                "boundary_lookahead_minutes must not be negative".to_string(),
            ));
        }
        if self.client.page_size == 0 || self.client.max_pages == 0 {
            return Err(Error::Config(
                "page_size and max_pages must be > 0".to_string(),
            ));
        }
        if self.client.requests_per_second == 0 || self.client.max_fetch_attempts == 0 {
            return Err(Error::Config(
                "requests_per_second and max_fetch_attempts must be > 0".to_string(),
            ));
        }
        if self.client.base_url.trim().is_empty() {
            return Err(Error::Config("api_base_url must not be empty".to_string()));
        }
        Ok(())
    }
}
