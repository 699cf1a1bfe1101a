//! In-memory collaborators for scan queue tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use doubleplay_common::{DatasetWindow, Error, PlayEvent, PlayKind, Result};
use doubleplay_scanner::error::UpstreamError;
use doubleplay_scanner::services::{DatasetStore, PlaylistSource, UpstreamHealth};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};

/// Fixed reference instant for deterministic windows
pub fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
}

pub fn track(id: i64, minutes: i64, artist: &str, title: &str) -> PlayEvent {
    PlayEvent {
        id,
        airdate: at(minutes),
        kind: PlayKind::Track,
        artist: artist.to_string(),
        title: title.to_string(),
        album: None,
        show_id: Some(7),
        host_id: None,
        dj: None,
        show_name: None,
    }
}

pub fn airbreak(id: i64, minutes: i64) -> PlayEvent {
    PlayEvent {
        id,
        airdate: at(minutes),
        kind: PlayKind::NonMusic,
        artist: String::new(),
        title: String::new(),
        album: None,
        show_id: None,
        host_id: None,
        dj: None,
        show_name: None,
    }
}

/// Playlist serving a fixed set of plays over `[start, end)`
#[derive(Default)]
pub struct FakePlaylist {
    plays: Mutex<Vec<PlayEvent>>,
    fail_next: AtomicU32,
    always_fail: AtomicBool,
    consecutive_failures: AtomicU32,
    requests: AtomicU64,
    fetches: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
    enrichments: AtomicU64,
    gate: Mutex<Option<Arc<Semaphore>>>,
    entered: Notify,
}

impl FakePlaylist {
    pub fn with_plays(plays: Vec<PlayEvent>) -> Self {
        let fake = Self::default();
        *fake.plays.lock().unwrap() = plays;
        fake
    }

    /// Fail the next `count` fetches
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn fail_always(&self) {
        self.always_fail.store(true, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn enrichments(&self) -> u64 {
        self.enrichments.load(Ordering::SeqCst)
    }

    /// Hold every fetch until a permit is added to the returned semaphore
    pub fn gate(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Resolves once a fetch has been entered
    pub async fn fetch_started(&self) {
        self.entered.notified().await;
    }
}

#[async_trait]
impl PlaylistSource for FakePlaylist {
    async fn fetch_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> std::result::Result<Vec<PlayEvent>, UpstreamError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.fetches.lock().unwrap().push((start, end));
        self.entered.notify_one();

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        let scheduled_failure = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scheduled_failure || self.always_fail.load(Ordering::SeqCst) {
            self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
            return Err(UpstreamError::Network("connection reset".to_string()));
        }

        self.consecutive_failures.store(0, Ordering::SeqCst);
        Ok(self
            .plays
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.airdate >= start && p.airdate < end)
            .cloned()
            .collect())
    }

    async fn enrich_show_info(&self, mut event: PlayEvent) -> PlayEvent {
        self.enrichments.fetch_add(1, Ordering::SeqCst);
        if event.show_id.is_some() {
            event.dj = Some("Fake Host".to_string());
            event.show_name = Some("Fake Show".to_string());
        }
        event
    }

    fn health_status(&self) -> UpstreamHealth {
        UpstreamHealth::from_failures(self.consecutive_failures.load(Ordering::SeqCst))
    }

    fn request_count(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }
}

/// Store keeping every saved snapshot in memory
pub struct MemoryStore {
    initial: DatasetWindow,
    saved: Mutex<Vec<DatasetWindow>>,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new(initial: DatasetWindow) -> Self {
        Self {
            initial,
            saved: Mutex::new(Vec::new()),
            fail_saves: AtomicBool::new(false),
        }
    }

    pub fn failing(initial: DatasetWindow) -> Self {
        let store = Self::new(initial);
        store.fail_saves.store(true, Ordering::SeqCst);
        store
    }

    pub fn saves(&self) -> Vec<DatasetWindow> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl DatasetStore for MemoryStore {
    async fn load(&self) -> Result<DatasetWindow> {
        Ok(self
            .saved
            .lock()
            .unwrap()
            .last()
            .cloned()
            .unwrap_or_else(|| self.initial.clone()))
    }

    async fn save(&self, dataset: &DatasetWindow) -> Result<()> {
        dataset.validate()?;
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::Validation("disk says no".to_string()));
        }
        self.saved.lock().unwrap().push(dataset.clone());
        Ok(())
    }
}
