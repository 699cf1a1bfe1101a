//! Scan progress per direction

use chrono::{DateTime, Utc};
use doubleplay_common::human_time::{format_duration, format_eta};
use doubleplay_common::ScanDirection;
use serde::Serialize;

/// Tracks how much of a direction's outstanding span has been scanned
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    direction: ScanDirection,
    total_secs: i64,
    covered_secs: i64,
    chunks: u64,
    started_at: DateTime<Utc>,
}

/// Serializable progress snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub direction: ScanDirection,
    pub percent: f64,
    pub covered_secs: i64,
    pub total_secs: i64,
    pub chunks: u64,
    pub elapsed_secs: i64,
    /// `None` until at least one chunk has been covered
    pub eta_secs: Option<i64>,
}

impl ProgressTracker {
    pub fn new(direction: ScanDirection, total_secs: i64, started_at: DateTime<Utc>) -> Self {
        Self {
            direction,
            total_secs: total_secs.max(0),
            covered_secs: 0,
            chunks: 0,
            started_at,
        }
    }

    /// Adjust the outstanding span; negative when queued work was dropped
    pub fn add_work(&mut self, secs: i64) {
        self.total_secs = (self.total_secs + secs).max(self.covered_secs);
    }

    pub fn record_chunk(&mut self, covered_secs: i64) {
        self.chunks += 1;
        self.covered_secs = (self.covered_secs + covered_secs.max(0)).min(self.total_secs);
    }

    pub fn is_complete(&self) -> bool {
        self.covered_secs >= self.total_secs
    }

    pub fn report(&self, now: DateTime<Utc>) -> ProgressReport {
        let elapsed_secs = (now - self.started_at).num_seconds().max(0);

        let percent = if self.total_secs == 0 {
            100.0
        } else {
            self.covered_secs as f64 / self.total_secs as f64 * 100.0
        };

        let eta_secs = if self.covered_secs > 0 {
            let remaining = (self.total_secs - self.covered_secs) as f64;
            let rate = elapsed_secs as f64 / self.covered_secs as f64;
            Some((remaining * rate).round() as i64)
        } else {
            None
        };

        ProgressReport {
            direction: self.direction,
            percent,
            covered_secs: self.covered_secs,
            total_secs: self.total_secs,
            chunks: self.chunks,
            elapsed_secs,
            eta_secs,
        }
    }
}

impl ProgressReport {
    /// One-line summary for logs
    pub fn display_string(&self) -> String {
        format!(
            "{} scan {:.1}% ({} of {} covered, {} chunks, elapsed {}, ETA {})",
            self.direction,
            self.percent,
            format_duration(self.covered_secs),
            format_duration(self.total_secs),
            self.chunks,
            format_duration(self.elapsed_secs),
            format_eta(self.eta_secs)
        )
    }
}
