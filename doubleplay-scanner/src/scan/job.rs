//! Scan jobs and chunking
//!
//! A job is never fetched in one go. Each step cuts a chunk of at most
//! `max_chunk` off the job and leaves the rest as a continuation:
//!
//! ```text
//! forward:   [start ---- chunk ----|------- remainder -------] end
//! backward:  [start ------- remainder -------|---- chunk ----] end
//! ```
//!
//! Forward jobs catch up towards now from the oldest missing instant;
//! backward jobs walk from the dataset start into history.

use crate::error::{ScanError, ScanResult};
use chrono::{DateTime, Duration, Utc};
use doubleplay_common::ScanDirection;
use serde::Serialize;
use uuid::Uuid;

/// One pending unit of scanning work over `[start, end]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanJob {
    pub id: Uuid,
    pub direction: ScanDirection,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ScanJob {
    pub fn new(direction: ScanDirection, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            direction,
            start,
            end,
        }
    }

    pub fn forward(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self::new(ScanDirection::Forward, start, end)
    }

    pub fn backward(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self::new(ScanDirection::Backward, start, end)
    }

    pub fn span(&self) -> Duration {
        self.end - self.start
    }

    /// Reject inverted bounds
    pub fn validate(&self) -> ScanResult<()> {
        if self.start > self.end {
            return Err(ScanError::MalformedJob(format!(
                "{} job {} starts at {} after its end {}",
                self.direction, self.id, self.start, self.end
            )));
        }
        Ok(())
    }

    /// Cut the next chunk; the remainder keeps the job id
    pub fn split(&self, max_chunk: Duration) -> (ScanJob, Option<ScanJob>) {
        match self.direction {
            ScanDirection::Forward => {
                let chunk_end = (self.start + max_chunk).min(self.end);
                let chunk = ScanJob::new(self.direction, self.start, chunk_end);
                let remainder = (chunk_end < self.end).then(|| ScanJob {
                    id: self.id,
                    direction: self.direction,
                    start: chunk_end,
                    end: self.end,
                });
                (chunk, remainder)
            }
            ScanDirection::Backward => {
                let chunk_start = (self.end - max_chunk).max(self.start);
                let chunk = ScanJob::new(self.direction, chunk_start, self.end);
                let remainder = (chunk_start > self.start).then(|| ScanJob {
                    id: self.id,
                    direction: self.direction,
                    start: self.start,
                    end: chunk_start,
                });
                (chunk, remainder)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    /// Split until nothing remains and return the chunks in processing order
    fn drain(job: ScanJob, max_chunk: Duration) -> Vec<ScanJob> {
        let mut chunks = Vec::new();
        let mut next = Some(job);
        while let Some(job) = next {
            let (chunk, remainder) = job.split(max_chunk);
            chunks.push(chunk);
            next = remainder;
        }
        chunks
    }

    #[test]
    fn test_forward_chunks_cover_span_exactly() {
        for (span, chunk) in [(0, 60), (59, 60), (60, 60), (61, 60), (600, 60), (245, 17)] {
            let chunks = drain(ScanJob::forward(at(0), at(span)), Duration::minutes(chunk));
            assert_eq!(chunks.first().unwrap().start, at(0));
            assert_eq!(chunks.last().unwrap().end, at(span));
            for pair in chunks.windows(2) {
                assert_eq!(pair[0].end, pair[1].start, "gap or overlap at span {}", span);
            }
            assert!(chunks.iter().all(|c| c.span() <= Duration::minutes(chunk)));
            assert!(chunks.iter().all(|c| c.validate().is_ok()));
        }
    }

    #[test]
    fn test_backward_chunks_walk_into_history() {
        for (span, chunk) in [(0, 60), (59, 60), (60, 60), (61, 60), (600, 60), (245, 17)] {
            let chunks = drain(ScanJob::backward(at(0), at(span)), Duration::minutes(chunk));
            assert_eq!(chunks.first().unwrap().end, at(span));
            assert_eq!(chunks.last().unwrap().start, at(0));
            for pair in chunks.windows(2) {
                assert_eq!(pair[0].start, pair[1].end, "gap or overlap at span {}", span);
            }
            assert!(chunks.iter().all(|c| c.span() <= Duration::minutes(chunk)));
        }
    }

    #[test]
    fn test_remainder_keeps_job_identity() {
        let job = ScanJob::forward(at(0), at(150));
        let (chunk, remainder) = job.split(Duration::minutes(60));
        let remainder = remainder.unwrap();
        assert_eq!(remainder.id, job.id);
        assert_ne!(chunk.id, job.id);
        assert_eq!(chunk.end, at(60));
        assert_eq!(remainder.start, at(60));
    }

    #[test]
    fn test_inverted_job_is_malformed() {
        let job = ScanJob::backward(at(10), at(0));
        assert!(matches!(job.validate(), Err(ScanError::MalformedJob(_))));
    }
}
