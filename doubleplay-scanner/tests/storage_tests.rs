//! JSON dataset store and backup mirror tests

use chrono::{Duration, TimeZone, Utc};
use doubleplay_common::{
    Classification, DatasetWindow, DoublePlayGroup, DoublePlayOccurrence, Error,
};
use doubleplay_scanner::services::{BackupSink, DatasetStore, JsonFileStore, MirrorBackup};
use tempfile::TempDir;

fn window() -> DatasetWindow {
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let mut first = DoublePlayOccurrence {
        timestamp: base,
        end_timestamp: None,
        play_id: 1,
        duration: None,
        play: None,
    };
    first.set_end(base + Duration::minutes(4));
    let second = DoublePlayOccurrence {
        timestamp: base + Duration::minutes(4),
        end_timestamp: None,
        play_id: 2,
        duration: None,
        play: None,
    };

    let mut window = DatasetWindow::new(base - Duration::hours(1), base + Duration::hours(1));
    window.double_plays.push(DoublePlayGroup {
        artist: "Artist".to_string(),
        title: "Song".to_string(),
        plays: vec![first, second],
        dj: Some("Host".to_string()),
        show: None,
        classification: Classification::Legitimate,
    });
    window.recount();
    window
}

/// TC-STORE-001: a missing file loads as an empty one-day window
#[tokio::test]
async fn tc_store_001_missing_file_is_default_window() {
    let temp_dir = TempDir::new().unwrap();
    let store = JsonFileStore::new(temp_dir.path().join("double_plays.json"));

    let before = Utc::now();
    let dataset = store.load().await.unwrap();

    assert!(dataset.double_plays.is_empty());
    assert!(dataset.end_date >= before);
    assert_eq!(dataset.end_date - dataset.start_date, Duration::days(1));
}

/// TC-STORE-002: saved datasets load back unchanged
#[tokio::test]
async fn tc_store_002_save_then_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested/double_plays.json");
    let store = JsonFileStore::new(&path);

    store.save(&window()).await.unwrap();
    assert!(path.exists());
    assert!(!temp_dir.path().join("nested/double_plays.json.tmp").exists());

    let loaded = store.load().await.unwrap();
    assert_eq!(loaded, window());

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["counts"]["legitimate"], 1);
    assert_eq!(raw["doublePlays"][0]["plays"][0]["duration"], 240);
}

/// TC-STORE-003: invalid datasets are refused and nothing is written
#[tokio::test]
async fn tc_store_003_save_rejects_invalid_dataset() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("double_plays.json");
    let store = JsonFileStore::new(&path);

    let mut invalid = window();
    invalid.counts.mistake = 5;

    let result = store.save(&invalid).await;
    assert!(matches!(result, Err(Error::Validation(_))));
    assert!(!path.exists());
}

/// TC-STORE-004: a corrupt file is an error, not an empty dataset
#[tokio::test]
async fn tc_store_004_corrupt_file_fails_to_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("double_plays.json");
    std::fs::write(&path, "{ not json").unwrap();

    let store = JsonFileStore::new(&path);
    assert!(matches!(store.load().await, Err(Error::Json(_))));
}

/// TC-STORE-005: the saved file can be mirrored into a backup folder
#[tokio::test]
async fn tc_store_005_backup_mirrors_saved_file() {
    let temp_dir = TempDir::new().unwrap();
    let store = JsonFileStore::new(temp_dir.path().join("double_plays.json"));
    store.save(&window()).await.unwrap();

    let location = store.location().unwrap();
    let mirror = MirrorBackup::new(temp_dir.path().join("backup"));
    mirror.backup(&location).await.unwrap();

    let mirrored = std::fs::read_to_string(temp_dir.path().join("backup/double_plays.json")).unwrap();
    let original = std::fs::read_to_string(location).unwrap();
    assert_eq!(mirrored, original);
}
