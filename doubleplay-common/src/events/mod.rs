//! Event types and EventBus for scan notifications
//!
//! The scan queue publishes what it did; monitoring, the health surface and
//! the backward-only run mode subscribe.

use crate::models::ScanDirection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Scan notifications
///
/// Events are broadcast via EventBus and can be serialized for transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DoublePlayEvent {
    /// One chunk fetched, analysed and saved
    ScanCompleted {
        direction: ScanDirection,
        chunk_start: DateTime<Utc>,
        chunk_end: DateTime<Utc>,
        /// Wall time spent on the chunk
        elapsed_ms: u64,
        /// Upstream requests made for the chunk
        requests: u64,
        /// Groups found in the chunk (before merging)
        groups_found: usize,
        timestamp: DateTime<Utc>,
    },

    /// A chunk could not be processed
    ScanChunkFailed {
        direction: ScanDirection,
        /// Consecutive failures so far
        retry_count: u32,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Backward scanning reached the historical floor
    BackwardScanComplete {
        floor: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// Dataset written to storage
    DatasetSaved {
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        group_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Queue drained, nothing pending
    QueueIdle { timestamp: DateTime<Utc> },
}

impl DoublePlayEvent {
    /// Event name for logging
    pub fn name(&self) -> &'static str {
        match self {
            DoublePlayEvent::ScanCompleted { .. } => "ScanCompleted",
            DoublePlayEvent::ScanChunkFailed { .. } => "ScanChunkFailed",
            DoublePlayEvent::BackwardScanComplete { .. } => "BackwardScanComplete",
            DoublePlayEvent::DatasetSaved { .. } => "DatasetSaved",
            DoublePlayEvent::QueueIdle { .. } => "QueueIdle",
        }
    }
}

/// Broadcast bus for [`DoublePlayEvent`]s
///
/// Cloning shares the underlying channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DoublePlayEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use doubleplay_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// let _rx = event_bus.subscribe();
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<DoublePlayEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: DoublePlayEvent) {
        let _ = self.tx.send(event);
    }
}
