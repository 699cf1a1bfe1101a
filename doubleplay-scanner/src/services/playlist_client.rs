//! Upstream playlist API client
//!
//! Fetches aired plays for a time window, following pagination links, with a
//! single shared rate limiter and exponential backoff per request. Tracks its
//! own health (consecutive failed calls) and request count for the scan queue.

use crate::config::ClientSettings;
use crate::error::UpstreamError;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use doubleplay_common::{PlayEvent, PlayKind};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Consecutive failed calls at which the upstream reports itself unhealthy
pub const UNHEALTHY_AFTER_FAILURES: u32 = 3;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(8);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Upstream health as seen by the scan queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpstreamHealth {
    pub healthy: bool,
    pub consecutive_failures: u32,
}

impl UpstreamHealth {
    pub fn from_failures(consecutive_failures: u32) -> Self {
        Self {
            healthy: consecutive_failures < UNHEALTHY_AFTER_FAILURES,
            consecutive_failures,
        }
    }
}

/// Source of aired plays
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    /// All plays aired in `[start, end]`, in whatever order the upstream returns them
    async fn fetch_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PlayEvent>, UpstreamError>;

    /// Fill in DJ/show names; returns the event unchanged on any failure
    async fn enrich_show_info(&self, event: PlayEvent) -> PlayEvent;

    fn health_status(&self) -> UpstreamHealth;

    /// Total HTTP requests issued so far
    fn request_count(&self) -> u64;
}

/// One page of the plays listing
#[derive(Debug, Deserialize)]
struct PlaysPage {
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

/// Play record as the upstream serves it
#[derive(Debug, Deserialize)]
struct UpstreamPlay {
    id: i64,
    airdate: DateTime<Utc>,
    #[serde(default)]
    play_type: String,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    song: Option<String>,
    #[serde(default)]
    album: Option<String>,
    #[serde(default)]
    show: Option<i64>,
    #[serde(default)]
    host: Option<i64>,
}

impl UpstreamPlay {
    fn into_event(self) -> PlayEvent {
        let kind = match self.play_type.as_str() {
            "trackplay" => PlayKind::Track,
            "airbreak" => PlayKind::NonMusic,
            _ => PlayKind::Other,
        };
        PlayEvent {
            id: self.id,
            airdate: self.airdate,
            kind,
            artist: self.artist.unwrap_or_default(),
            title: self.song.unwrap_or_default(),
            album: self.album.filter(|a| !a.trim().is_empty()),
            show_id: self.show,
            host_id: self.host,
            dj: None,
            show_name: None,
        }
    }
}

/// Show record as the upstream serves it
#[derive(Debug, Clone, Deserialize)]
struct ShowInfo {
    #[serde(default)]
    program_name: Option<String>,
    #[serde(default)]
    host_names: Vec<String>,
}

impl ShowInfo {
    fn apply(&self, mut event: PlayEvent) -> PlayEvent {
        let hosts: Vec<&str> = self
            .host_names
            .iter()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .collect();
        if !hosts.is_empty() {
            event.dj = Some(hosts.join(", "));
        }
        if let Some(name) = self.program_name.as_ref().filter(|n| !n.trim().is_empty()) {
            event.show_name = Some(name.trim().to_string());
        }
        event
    }
}

/// Convert a raw page entry, skipping records we cannot use
fn parse_play(value: serde_json::Value) -> Option<PlayEvent> {
    match serde_json::from_value::<UpstreamPlay>(value) {
        Ok(play) => Some(play.into_event()),
        Err(e) => {
            tracing::debug!(error = %e, "Skipping malformed play record");
            None
        }
    }
}

fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// HTTP implementation of [`PlaylistSource`]
pub struct HttpPlaylistClient {
    http_client: reqwest::Client,
    settings: ClientSettings,
    rate_limiter: DefaultDirectRateLimiter,
    consecutive_failures: AtomicU32,
    requests: AtomicU64,
    /// Show lookups by show id; `None` records a failed lookup
    show_cache: Mutex<HashMap<i64, Option<ShowInfo>>>,
}

impl HttpPlaylistClient {
    pub fn new(settings: ClientSettings) -> Result<Self, UpstreamError> {
        let http_client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        let per_second = NonZeroU32::new(settings.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(per_second));

        Ok(Self {
            http_client,
            settings,
            rate_limiter,
            consecutive_failures: AtomicU32::new(0),
            requests: AtomicU64::new(0),
            show_cache: Mutex::new(HashMap::new()),
        })
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    fn record_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// One rate-limited GET, no retries
    async fn get_once<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        self.rate_limiter.until_ready().await;
        self.requests.fetch_add(1, Ordering::Relaxed);

        let response = self.http_client.get(url).query(query).send().await?;
        let status = response.status();

        if status.as_u16() == 429 {
            return Err(UpstreamError::RateLimited);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Api(status.as_u16(), error_text));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| UpstreamError::Parse(e.to_string()))
    }

    /// GET with exponential backoff on retriable failures, no health accounting
    async fn get_with_backoff<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        let mut attempt = 0;
        let mut backoff = INITIAL_BACKOFF;

        loop {
            attempt += 1;
            match self.get_once(url, query).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retriable() && attempt < self.settings.max_fetch_attempts => {
                    tracing::debug!(
                        url = %url,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Upstream request failed, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Playlist GET; outcomes feed the consecutive-failure counter
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        match self.get_with_backoff(url, query).await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                let failures = self.record_failure();
                tracing::debug!(
                    url = %url,
                    consecutive_failures = failures,
                    error = %err,
                    "Upstream request failed"
                );
                Err(err)
            }
        }
    }

    async fn lookup_show(&self, show_id: i64) -> Option<ShowInfo> {
        if let Some(cached) = self.show_cache.lock().await.get(&show_id) {
            return cached.clone();
        }

        let url = format!("{}/shows/{}/", self.settings.base_url, show_id);
        // enrichment failures never touch upstream health
        let info = match self.get_with_backoff::<ShowInfo>(&url, &[]).await {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::debug!(show_id, error = %e, "Show lookup failed");
                None
            }
        };

        self.show_cache.lock().await.insert(show_id, info.clone());
        info
    }
}

#[async_trait]
impl PlaylistSource for HttpPlaylistClient {
    async fn fetch_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PlayEvent>, UpstreamError> {
        let mut url = format!("{}/plays/", self.settings.base_url);
        let first_query = vec![
            ("airdate_after", format_instant(start)),
            ("airdate_before", format_instant(end)),
            ("ordering", "airdate".to_string()),
            ("limit", self.settings.page_size.to_string()),
        ];
        let mut query: &[(&str, String)] = &first_query;
        let mut seen_pages = HashSet::new();
        let mut events = Vec::new();

        for _ in 0..self.settings.max_pages {
            let page: PlaysPage = self.get_json(&url, query).await?;
            events.extend(page.results.into_iter().filter_map(parse_play));

            // `next` links carry their own query string
            query = &[];
            match page.next {
                Some(next) if !next.trim().is_empty() => {
                    if !seen_pages.insert(next.clone()) {
                        tracing::warn!(url = %next, "Pagination cycle detected, stopping");
                        return Ok(events);
                    }
                    url = next;
                }
                _ => return Ok(events),
            }
        }

        tracing::warn!(
            max_pages = self.settings.max_pages,
            start = %start,
            end = %end,
            "Page cap reached, returning partial window"
        );
        Ok(events)
    }

    async fn enrich_show_info(&self, event: PlayEvent) -> PlayEvent {
        let Some(show_id) = event.show_id else {
            return event;
        };
        match self.lookup_show(show_id).await {
            Some(info) => info.apply(event),
            None => event,
        }
    }

    fn health_status(&self) -> UpstreamHealth {
        UpstreamHealth::from_failures(self.consecutive_failures.load(Ordering::Relaxed))
    }

    fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_play_maps_kinds() {
        let track = parse_play(json!({
            "id": 10,
            "airdate": "2024-03-01T12:00:00-08:00",
            "play_type": "trackplay",
            "artist": "Artist",
            "song": "Song",
            "album": "",
            "show": 7
        }))
        .unwrap();
        assert_eq!(track.kind, PlayKind::Track);
        assert_eq!(track.title, "Song");
        assert_eq!(track.album, None);
        assert_eq!(track.show_id, Some(7));
        assert_eq!(track.airdate.to_rfc3339(), "2024-03-01T20:00:00+00:00");

        let airbreak = parse_play(json!({
            "id": 11,
            "airdate": "2024-03-01T20:04:00Z",
            "play_type": "airbreak"
        }))
        .unwrap();
        assert_eq!(airbreak.kind, PlayKind::NonMusic);
        assert!(airbreak.artist.is_empty());

        let other = parse_play(json!({
            "id": 12,
            "airdate": "2024-03-01T20:05:00Z",
            "play_type": "nontrackplay"
        }))
        .unwrap();
        assert_eq!(other.kind, PlayKind::Other);
    }

    #[test]
    fn test_parse_play_skips_records_without_airdate() {
        assert!(parse_play(json!({ "id": 1, "play_type": "trackplay" })).is_none());
    }

    #[test]
    fn test_show_info_apply() {
        let event = parse_play(json!({
            "id": 1,
            "airdate": "2024-03-01T20:00:00Z",
            "play_type": "trackplay",
            "artist": "A",
            "song": "S"
        }))
        .unwrap();
        let info = ShowInfo {
            program_name: Some(" The Morning Show ".to_string()),
            host_names: vec!["Host One".to_string(), " ".to_string(), "Host Two".to_string()],
        };
        let enriched = info.apply(event);
        assert_eq!(enriched.dj.as_deref(), Some("Host One, Host Two"));
        assert_eq!(enriched.show_name.as_deref(), Some("The Morning Show"));
    }

    #[test]
    fn test_health_threshold() {
        assert!(UpstreamHealth::from_failures(0).healthy);
        assert!(UpstreamHealth::from_failures(UNHEALTHY_AFTER_FAILURES - 1).healthy);
        assert!(!UpstreamHealth::from_failures(UNHEALTHY_AFTER_FAILURES).healthy);
    }

    #[test]
    fn test_client_starts_healthy() {
        let client = HttpPlaylistClient::new(ClientSettings::default()).unwrap();
        assert_eq!(client.health_status(), UpstreamHealth::from_failures(0));
        assert_eq!(client.request_count(), 0);
    }

    #[test]
    fn test_failure_counter_resets_on_success() {
        let client = HttpPlaylistClient::new(ClientSettings::default()).unwrap();
        client.record_failure();
        client.record_failure();
        assert_eq!(client.health_status().consecutive_failures, 2);
        client.record_success();
        assert_eq!(client.health_status().consecutive_failures, 0);
    }
}
