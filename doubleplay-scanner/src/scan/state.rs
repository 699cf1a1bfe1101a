//! Scan state
//!
//! Mutated only by the scan queue; everyone else gets a [`ScanState`] copy.

use chrono::{DateTime, Utc};
use doubleplay_common::ScanDirection;
use serde::Serialize;
use std::fmt;

/// What the queue is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanActivity {
    Forward,
    Backward,
    Idle,
}

impl From<ScanDirection> for ScanActivity {
    fn from(direction: ScanDirection) -> Self {
        match direction {
            ScanDirection::Forward => ScanActivity::Forward,
            ScanDirection::Backward => ScanActivity::Backward,
        }
    }
}

impl fmt::Display for ScanActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanActivity::Forward => write!(f, "forward"),
            ScanActivity::Backward => write!(f, "backward"),
            ScanActivity::Idle => write!(f, "idle"),
        }
    }
}

/// Point-in-time copy of the scan state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanState {
    pub activity: ScanActivity,
    /// Bounds of the chunk in flight; `None` while idle
    pub job_start: Option<DateTime<Utc>>,
    pub job_end: Option<DateTime<Utc>>,
    pub total_requests: u64,
    pub forward_requests: u64,
    pub backward_requests: u64,
    /// Consecutive failed chunks
    pub retry_count: u32,
    pub running: bool,
    pub pending_jobs: usize,
    pub backward_complete: bool,
    pub last_success: Option<DateTime<Utc>>,
}

impl Default for ScanState {
    fn default() -> Self {
        Self {
            activity: ScanActivity::Idle,
            job_start: None,
            job_end: None,
            total_requests: 0,
            forward_requests: 0,
            backward_requests: 0,
            retry_count: 0,
            running: false,
            pending_jobs: 0,
            backward_complete: false,
            last_success: None,
        }
    }
}

impl ScanState {
    pub fn begin_chunk(&mut self, direction: ScanDirection, start: DateTime<Utc>, end: DateTime<Utc>) {
        self.activity = direction.into();
        self.job_start = Some(start);
        self.job_end = Some(end);
    }

    pub fn record_requests(&mut self, direction: ScanDirection, requests: u64) {
        self.total_requests += requests;
        match direction {
            ScanDirection::Forward => self.forward_requests += requests,
            ScanDirection::Backward => self.backward_requests += requests,
        }
    }

    pub fn record_success(&mut self, at: DateTime<Utc>) {
        self.retry_count = 0;
        self.last_success = Some(at);
    }

    /// Returns the new consecutive failure count
    pub fn record_failure(&mut self) -> u32 {
        self.retry_count += 1;
        self.retry_count
    }

    /// Queue drained
    pub fn set_idle(&mut self) {
        self.activity = ScanActivity::Idle;
        self.job_start = None;
        self.job_end = None;
        self.pending_jobs = 0;
    }
}
