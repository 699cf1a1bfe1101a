//! Configuration file and data folder resolution tests
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that touch DOUBLEPLAY_* variables are marked with #[serial].

use doubleplay_common::config::{
    default_data_folder, load_or_default, load_toml_config, locate_config_file,
    resolve_data_folder, TomlConfig, CONFIG_PATH_ENV, DATA_FOLDER_ENV,
};
use doubleplay_common::Error;
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
fn test_full_toml_file_parses() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
data_folder = "/srv/doubleplay"
dataset_file = "plays.json"
api_base_url = "http://localhost:9000/v2"
page_size = 50
max_chunk_minutes = 30
forward_interval_secs = 120
history_stop_date = "2024-01-01T00:00:00Z"
health_port = 0
fail_on_save_error = true
"#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.data_folder, Some(PathBuf::from("/srv/doubleplay")));
    assert_eq!(config.dataset_file.as_deref(), Some("plays.json"));
    assert_eq!(config.page_size, Some(50));
    assert_eq!(config.max_chunk_minutes, Some(30));
    assert_eq!(config.forward_interval_secs, Some(120));
    assert_eq!(config.health_port, Some(0));
    assert_eq!(config.fail_on_save_error, Some(true));
    assert!(config.backup_folder.is_none());
}

#[test]
fn test_malformed_toml_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "page_size = \"many\"").unwrap();

    assert!(matches!(load_toml_config(&path), Err(Error::Config(_))));
}

#[test]
fn test_missing_explicit_file_is_config_error() {
    let result = load_or_default(Some(Path::new("/nonexistent/doubleplay/config.toml")));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_config_env_var_used_when_no_cli_path() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("from_env.toml");
    std::fs::write(&path, "page_size = 25").unwrap();
    env::set_var(CONFIG_PATH_ENV, &path);

    assert_eq!(locate_config_file(None), Some(path.clone()));
    let config = load_or_default(None).unwrap();
    assert_eq!(config.page_size, Some(25));

    env::remove_var(CONFIG_PATH_ENV);
}

#[test]
#[serial]
fn test_data_folder_priority_order() {
    env::remove_var(DATA_FOLDER_ENV);
    let toml_config = TomlConfig {
        data_folder: Some(PathBuf::from("/from/toml")),
        ..Default::default()
    };

    // TOML beats compiled default
    assert_eq!(
        resolve_data_folder(None, &toml_config),
        PathBuf::from("/from/toml")
    );

    // Environment beats TOML
    env::set_var(DATA_FOLDER_ENV, "/from/env");
    assert_eq!(
        resolve_data_folder(None, &toml_config),
        PathBuf::from("/from/env")
    );

    // CLI beats everything
    assert_eq!(
        resolve_data_folder(Some(Path::new("/from/cli")), &toml_config),
        PathBuf::from("/from/cli")
    );

    env::remove_var(DATA_FOLDER_ENV);
}

#[test]
#[serial]
fn test_data_folder_falls_back_to_default() {
    env::remove_var(DATA_FOLDER_ENV);
    assert_eq!(
        resolve_data_folder(None, &TomlConfig::default()),
        default_data_folder()
    );
}
