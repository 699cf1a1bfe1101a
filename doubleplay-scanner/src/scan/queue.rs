//! Scan queue
//!
//! Owns the dataset and the scan state. Jobs are drained one chunk at a time
//! by a single loop; forward work sits at the head of the queue and backward
//! work at the tail, so catching up on live data is never starved by
//! historical backfill.
//!
//! Per chunk: fetch → detect → boundary lookahead → show enrichment → merge
//! → advance window → save → notify. Timers (periodic forward trigger, retry
//! delays) only enqueue work and kick the drain loop.

use super::job::ScanJob;
use super::progress::{ProgressReport, ProgressTracker};
use super::state::ScanState;
use crate::config::ScanSettings;
use crate::detection::{
    apply_first_play_metadata, detect, merge_groups, resolve_boundary, DetectionOutcome,
};
use crate::error::{ScanError, ScanResult, UpstreamError};
use crate::services::{BackupSink, DatasetStore, PlaylistSource, UpstreamHealth};
use chrono::{DateTime, Utc};
use doubleplay_common::events::{DoublePlayEvent, EventBus};
use doubleplay_common::time::span_seconds;
use doubleplay_common::{DatasetWindow, ScanDirection};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Consecutive chunk failures tolerated before warning about them
pub const QUIET_RETRY_LIMIT: u32 = 3;

/// Base delay before retrying a backward job against an unhealthy upstream
pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(5);

/// Added to the retry delay per consecutive upstream failure
pub const RETRY_STEP_DELAY: Duration = Duration::from_secs(2);

/// Whether a chunk failure is loud enough to warn about
pub fn retry_warning_due(retry_count: u32) -> bool {
    retry_count > QUIET_RETRY_LIMIT
}

/// Delay before retrying a backward job given the upstream's failure count
pub fn retry_delay(consecutive_failures: u32) -> Duration {
    RETRY_BASE_DELAY + RETRY_STEP_DELAY * consecutive_failures
}

struct QueueInner {
    jobs: VecDeque<ScanJob>,
    dataset: DatasetWindow,
    state: ScanState,
    forward_progress: Option<ProgressTracker>,
    backward_progress: Option<ProgressTracker>,
    history_floor: DateTime<Utc>,
    /// Bumped by every forward trigger; a chunk started under an older value is superseded
    forward_generation: u64,
}

impl QueueInner {
    fn has_backward_job(&self) -> bool {
        self.jobs
            .iter()
            .any(|job| job.direction == ScanDirection::Backward)
    }

    /// Forward at the head; backward at the tail unless one is already queued
    fn push(&mut self, job: ScanJob) -> bool {
        match job.direction {
            ScanDirection::Forward => self.jobs.push_front(job),
            ScanDirection::Backward => {
                if self.has_backward_job() {
                    return false;
                }
                self.jobs.push_back(job);
            }
        }
        self.state.pending_jobs = self.jobs.len();
        true
    }

    fn tracker_mut(&mut self, direction: ScanDirection) -> &mut Option<ProgressTracker> {
        match direction {
            ScanDirection::Forward => &mut self.forward_progress,
            ScanDirection::Backward => &mut self.backward_progress,
        }
    }

    fn add_work(&mut self, direction: ScanDirection, secs: i64) {
        match self.tracker_mut(direction) {
            Some(tracker) if !tracker.is_complete() => tracker.add_work(secs),
            slot => *slot = Some(ProgressTracker::new(direction, secs, Utc::now())),
        }
    }

    /// Take dropped work off an existing tracker
    fn remove_work(&mut self, direction: ScanDirection, secs: i64) {
        if let Some(tracker) = self.tracker_mut(direction).as_mut() {
            tracker.add_work(-secs);
        }
    }

    fn is_superseded(&self, direction: ScanDirection, generation: u64) -> bool {
        direction == ScanDirection::Forward && self.forward_generation != generation
    }

    /// Move queued forward jobs past `until`, dropping those left empty
    fn clip_forward_jobs(&mut self, until: DateTime<Utc>) {
        let mut clipped = 0;
        for job in self.jobs.iter_mut() {
            if job.direction == ScanDirection::Forward && job.start < until {
                let start = until.min(job.end);
                clipped += span_seconds(job.start, start);
                job.start = start;
            }
        }
        self.jobs
            .retain(|job| job.direction != ScanDirection::Forward || job.start < job.end);
        self.state.pending_jobs = self.jobs.len();
        self.remove_work(ScanDirection::Forward, clipped);
    }
}

/// Chunked forward/backward scanner over the upstream playlist
pub struct ScanQueue {
    source: Arc<dyn PlaylistSource>,
    store: Arc<dyn DatasetStore>,
    backup: Arc<dyn BackupSink>,
    events: EventBus,
    settings: ScanSettings,
    inner: Mutex<QueueInner>,
    draining: AtomicBool,
    cancel: CancellationToken,
}

impl ScanQueue {
    pub fn new(
        source: Arc<dyn PlaylistSource>,
        store: Arc<dyn DatasetStore>,
        backup: Arc<dyn BackupSink>,
        events: EventBus,
        settings: ScanSettings,
    ) -> Arc<Self> {
        let now = Utc::now();
        let inner = QueueInner {
            jobs: VecDeque::new(),
            dataset: DatasetWindow::empty_default(now),
            state: ScanState::default(),
            forward_progress: None,
            backward_progress: None,
            history_floor: settings.history_floor(now),
            forward_generation: 0,
        };

        Arc::new(Self {
            source,
            store,
            backup,
            events,
            settings,
            inner: Mutex::new(inner),
            draining: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        })
    }

    /// Replace the in-memory dataset with the stored one
    pub async fn load_dataset(&self) -> ScanResult<()> {
        let dataset = self.store.load().await.map_err(ScanError::Persistence)?;
        self.inner.lock().await.dataset = dataset;
        Ok(())
    }

    /// Load the dataset, queue the initial jobs, start timers and draining
    pub async fn start(self: &Arc<Self>) -> ScanResult<()> {
        self.load_dataset().await?;

        let now = Utc::now();
        let floor = self.settings.history_floor(now);
        let mut backward_done = false;

        {
            let mut inner = self.inner.lock().await;
            inner.history_floor = floor;
            inner.state.running = true;

            let dataset_start = inner.dataset.start_date;
            if dataset_start > floor {
                inner.add_work(ScanDirection::Backward, span_seconds(floor, dataset_start));
                inner.push(ScanJob::backward(floor, dataset_start));
            } else {
                inner.state.backward_complete = true;
                backward_done = true;
            }

            let dataset_end = inner.dataset.end_date;
            if !self.settings.backward_only && dataset_end < now {
                inner.add_work(ScanDirection::Forward, span_seconds(dataset_end, now));
                inner.push(ScanJob::forward(dataset_end, now));
            }

            tracing::info!(
                dataset_start = %dataset_start,
                dataset_end = %dataset_end,
                history_floor = %floor,
                pending_jobs = inner.jobs.len(),
                backward_only = self.settings.backward_only,
                "Scan queue started"
            );
        }

        if backward_done {
            tracing::info!(floor = %floor, "Dataset already reaches the historical floor");
            self.events.emit_lossy(DoublePlayEvent::BackwardScanComplete {
                floor,
                timestamp: Utc::now(),
            });
        }

        if !self.settings.backward_only {
            self.spawn_forward_trigger();
        }
        self.kick();
        Ok(())
    }

    /// Cancel timers and stop draining after the chunk in flight
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.inner.lock().await.state.running = false;
        tracing::info!("Scan queue stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Queue a new job; returns false if a backward job was already pending
    pub async fn enqueue(&self, job: ScanJob) -> bool {
        let mut inner = self.inner.lock().await;
        let span = span_seconds(job.start, job.end);
        let direction = job.direction;
        let queued = inner.push(job);
        if queued {
            inner.add_work(direction, span);
        }
        queued
    }

    /// Replace any pending forward job with one covering `[dataset end, now]`
    pub async fn trigger_forward(self: &Arc<Self>) {
        let now = Utc::now();
        {
            let mut inner = self.inner.lock().await;
            let dataset_end = inner.dataset.end_date;
            if dataset_end >= now {
                return;
            }

            let mut removed_secs = 0;
            inner.jobs.retain(|job| {
                if job.direction == ScanDirection::Forward {
                    removed_secs += span_seconds(job.start, job.end);
                    false
                } else {
                    true
                }
            });

            inner.forward_generation += 1;
            let span = span_seconds(dataset_end, now);
            inner.push(ScanJob::forward(dataset_end, now));
            inner.add_work(ScanDirection::Forward, span - removed_secs);

            tracing::debug!(
                start = %dataset_end,
                end = %now,
                replaced_secs = removed_secs,
                "Forward scan triggered"
            );
        }
        self.kick();
    }

    /// Start a drain on a background task
    pub fn kick(self: &Arc<Self>) {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            queue.process_queue().await;
        });
    }

    /// Drain the queue; returns immediately if a drain is already running
    pub async fn process_queue(self: &Arc<Self>) {
        if self.draining.swap(true, Ordering::AcqRel) {
            return;
        }

        loop {
            let halted = self.drain_jobs().await;
            self.finish_drain().await;
            self.draining.store(false, Ordering::Release);

            // work enqueued while finishing would otherwise sit until the next kick
            if halted || self.is_stopped() || self.inner.lock().await.jobs.is_empty() {
                break;
            }
            if self.draining.swap(true, Ordering::AcqRel) {
                break;
            }
        }
    }

    /// Returns true when a chunk error halted the drain
    async fn drain_jobs(self: &Arc<Self>) -> bool {
        while !self.is_stopped() {
            let job = {
                let mut inner = self.inner.lock().await;
                let job = inner.jobs.pop_front();
                inner.state.pending_jobs = inner.jobs.len();
                job
            };
            let Some(job) = job else {
                return false;
            };
            let direction = job.direction;

            match self.process_chunk(job).await {
                Ok(()) => {}
                Err(ScanError::Persistence(e)) if self.settings.fail_on_save_error => {
                    tracing::error!(error = %e, "Dataset save failed, halting scan queue");
                    self.emit_chunk_failed(direction, e.to_string()).await;
                    return true;
                }
                Err(e) => {
                    tracing::error!(direction = %direction, error = %e, "Scan chunk failed");
                    self.emit_chunk_failed(direction, e.to_string()).await;
                }
            }
        }
        false
    }

    /// Reset state after a drain
    async fn finish_drain(&self) {
        let mut inner = self.inner.lock().await;
        let pending = inner.jobs.len();
        inner.state.set_idle();
        inner.state.pending_jobs = pending;

        if pending == 0 {
            tracing::debug!("Scan queue idle");
            self.events.emit_lossy(DoublePlayEvent::QueueIdle {
                timestamp: Utc::now(),
            });
        }
    }

    async fn emit_chunk_failed(&self, direction: ScanDirection, message: String) {
        let retry_count = self.inner.lock().await.state.retry_count;
        self.events.emit_lossy(DoublePlayEvent::ScanChunkFailed {
            direction,
            retry_count,
            message,
            timestamp: Utc::now(),
        });
    }

    /// Process the next chunk of `job`
    async fn process_chunk(self: &Arc<Self>, job: ScanJob) -> ScanResult<()> {
        job.validate()?;

        let (chunk, remainder) = job.split(self.settings.max_chunk);
        let started = tokio::time::Instant::now();
        let requests_before = self.source.request_count();

        let generation = {
            let mut inner = self.inner.lock().await;
            inner.state.begin_chunk(chunk.direction, chunk.start, chunk.end);
            inner.forward_generation
        };

        tracing::debug!(
            direction = %chunk.direction,
            chunk_start = %chunk.start,
            chunk_end = %chunk.end,
            "Scanning chunk"
        );

        let events = match self.source.fetch_events(chunk.start, chunk.end).await {
            Ok(events) => events,
            Err(err) => {
                self.record_requests(chunk.direction, requests_before).await;
                self.handle_fetch_failure(job, err, generation).await;
                return Ok(());
            }
        };

        let mut outcome = detect(&events, chunk.end);

        if let Some(boundary) = outcome.open_boundary {
            self.resolve_open_boundary(&mut outcome, boundary).await;
        }

        for group in &mut outcome.groups {
            if let Some(first) = group.plays.first_mut() {
                if let Some(play) = first.play.take() {
                    first.play = Some(self.source.enrich_show_info(play).await);
                }
            }
            apply_first_play_metadata(group);
        }

        let groups_found = outcome.groups.len();
        let (snapshot, summary) = {
            let mut inner = self.inner.lock().await;
            let summary = merge_groups(&mut inner.dataset.double_plays, outcome.groups);
            inner.dataset.sort_groups();
            inner.dataset.recount();

            match chunk.direction {
                ScanDirection::Forward => inner.dataset.extend_end(chunk.end),
                ScanDirection::Backward => inner.dataset.extend_start(chunk.start),
            }

            let superseded = inner.is_superseded(chunk.direction, generation);
            if superseded {
                inner.clip_forward_jobs(chunk.end);
            }
            match remainder.clone() {
                Some(rest) if superseded => {
                    tracing::debug!(
                        start = %rest.start,
                        end = %rest.end,
                        "Forward continuation superseded by a newer trigger"
                    );
                    inner.remove_work(ScanDirection::Forward, span_seconds(rest.start, rest.end));
                }
                Some(rest) => {
                    inner.push(rest);
                }
                None => {}
            }

            let covered = span_seconds(chunk.start, chunk.end);
            if let Some(tracker) = inner.tracker_mut(chunk.direction).as_mut() {
                tracker.record_chunk(covered);
                tracing::info!("{}", tracker.report(Utc::now()).display_string());
            }

            (inner.dataset.clone(), summary)
        };

        let requests = self.record_requests(chunk.direction, requests_before).await;

        tracing::debug!(
            direction = %chunk.direction,
            events = events.len(),
            dropped_out_of_order = outcome.dropped_out_of_order,
            groups_found,
            groups_added = summary.added,
            new_occurrences = summary.new_occurrences,
            requests,
            "Chunk analysed"
        );

        let save_result = self.save(&snapshot).await;

        if save_result.is_ok() {
            let now = Utc::now();
            self.inner.lock().await.state.record_success(now);
            self.events.emit_lossy(DoublePlayEvent::ScanCompleted {
                direction: chunk.direction,
                chunk_start: chunk.start,
                chunk_end: chunk.end,
                elapsed_ms: started.elapsed().as_millis() as u64,
                requests,
                groups_found,
                timestamp: now,
            });
        }

        if chunk.direction == ScanDirection::Backward && remainder.is_none() {
            self.check_backward_complete(chunk.start).await;
        }

        save_result
    }

    /// Fetch a short window after the chunk to find where its last play ended
    async fn resolve_open_boundary(
        &self,
        outcome: &mut DetectionOutcome,
        boundary: DateTime<Utc>,
    ) {
        let lookahead = self.settings.boundary_lookahead;
        if lookahead <= chrono::Duration::zero() || boundary >= Utc::now() {
            return;
        }

        match self.source.fetch_events(boundary, boundary + lookahead).await {
            Ok(extra) => {
                if !resolve_boundary(outcome, &extra) {
                    tracing::debug!(boundary = %boundary, "No play found after window boundary");
                }
            }
            Err(e) => {
                tracing::debug!(boundary = %boundary, error = %e, "Boundary lookahead failed");
            }
        }
    }

    /// Persist, then mirror in the background. Failures are logged and returned.
    async fn save(&self, snapshot: &DatasetWindow) -> ScanResult<()> {
        if let Err(e) = self.store.save(snapshot).await {
            tracing::error!(
                error = %e,
                groups = snapshot.double_plays.len(),
                "CRITICAL: dataset save failed, in-memory dataset kept"
            );
            return Err(ScanError::Persistence(e));
        }

        self.events.emit_lossy(DoublePlayEvent::DatasetSaved {
            start_date: snapshot.start_date,
            end_date: snapshot.end_date,
            group_count: snapshot.double_plays.len(),
            timestamp: Utc::now(),
        });

        if let Some(path) = self.store.location() {
            let backup = Arc::clone(&self.backup);
            tokio::spawn(async move {
                if let Err(e) = backup.backup(&path).await {
                    tracing::warn!(path = %path.display(), error = %e, "Dataset backup failed");
                }
            });
        }
        Ok(())
    }

    async fn record_requests(&self, direction: ScanDirection, before: u64) -> u64 {
        let requests = self.source.request_count().saturating_sub(before);
        self.inner
            .lock()
            .await
            .state
            .record_requests(direction, requests);
        requests
    }

    /// Requeue, delay or drop a job whose fetch failed
    async fn handle_fetch_failure(
        self: &Arc<Self>,
        job: ScanJob,
        err: UpstreamError,
        generation: u64,
    ) {
        let health = self.source.health_status();
        let direction = job.direction;
        let err = ScanError::from(err);

        let retry_count = {
            let mut inner = self.inner.lock().await;
            let retry_count = inner.state.record_failure();
            let span = span_seconds(job.start, job.end);

            if inner.is_superseded(direction, generation) {
                // the newer forward job already covers this window
                inner.remove_work(direction, span);
            } else {
                match (health.healthy, direction) {
                    (true, _) => {
                        inner.push(job.clone());
                    }
                    (false, ScanDirection::Forward) => inner.remove_work(direction, span),
                    (false, ScanDirection::Backward) => {}
                }
            }
            retry_count
        };

        if retry_warning_due(retry_count) {
            tracing::warn!(
                direction = %direction,
                retry_count,
                upstream_failures = health.consecutive_failures,
                error = %err,
                "Scan chunk keeps failing"
            );
        } else {
            tracing::debug!(
                direction = %direction,
                retry_count,
                upstream_failures = health.consecutive_failures,
                error = %err,
                "Scan chunk failed, will retry"
            );
        }

        self.events.emit_lossy(DoublePlayEvent::ScanChunkFailed {
            direction,
            retry_count,
            message: err.to_string(),
            timestamp: Utc::now(),
        });

        if health.healthy {
            return;
        }

        match direction {
            ScanDirection::Forward => {
                tracing::debug!(
                    start = %job.start,
                    end = %job.end,
                    "Upstream unhealthy, dropping forward job until the next trigger"
                );
            }
            ScanDirection::Backward => {
                let delay = retry_delay(health.consecutive_failures);
                tracing::debug!(delay_ms = delay.as_millis() as u64, "Backward job retry scheduled");
                self.schedule_retry(job, delay);
            }
        }
    }

    fn schedule_retry(self: &Arc<Self>, job: ScanJob, delay: Duration) {
        let queue = Arc::clone(self);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let pushed = queue.inner.lock().await.push(job);
                    if pushed {
                        queue.process_queue().await;
                    }
                }
            }
        });
    }

    async fn check_backward_complete(&self, reached: DateTime<Utc>) {
        let floor = {
            let mut inner = self.inner.lock().await;
            if reached > inner.history_floor || inner.state.backward_complete {
                return;
            }
            inner.state.backward_complete = true;
            inner.history_floor
        };

        tracing::info!(floor = %floor, "Backward scan reached the historical floor");
        self.events.emit_lossy(DoublePlayEvent::BackwardScanComplete {
            floor,
            timestamp: Utc::now(),
        });
    }

    fn spawn_forward_trigger(self: &Arc<Self>) {
        let queue = Arc::clone(self);
        let cancel = self.cancel.clone();
        let period = self.settings.forward_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // first tick fires immediately; start() already queued a forward job
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => queue.trigger_forward().await,
                }
            }
        });
    }

    pub async fn state_snapshot(&self) -> ScanState {
        let inner = self.inner.lock().await;
        let mut state = inner.state.clone();
        state.pending_jobs = inner.jobs.len();
        state
    }

    pub async fn dataset_snapshot(&self) -> DatasetWindow {
        self.inner.lock().await.dataset.clone()
    }

    pub async fn queued_jobs(&self) -> Vec<ScanJob> {
        self.inner.lock().await.jobs.iter().cloned().collect()
    }

    pub async fn progress(&self) -> Vec<ProgressReport> {
        let inner = self.inner.lock().await;
        let now = Utc::now();
        [&inner.forward_progress, &inner.backward_progress]
            .into_iter()
            .flatten()
            .map(|tracker| tracker.report(now))
            .collect()
    }

    pub fn upstream_health(&self) -> UpstreamHealth {
        self.source.health_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_failures_stay_quiet() {
        assert!(!retry_warning_due(1));
        assert!(!retry_warning_due(QUIET_RETRY_LIMIT));
        assert!(retry_warning_due(QUIET_RETRY_LIMIT + 1));
    }

    #[test]
    fn test_retry_delay_grows_with_failures() {
        assert_eq!(retry_delay(0), Duration::from_secs(5));
        assert_eq!(retry_delay(3), Duration::from_secs(11));
    }
}
