//! Chunked incremental scanning of the upstream playlist

pub mod job;
pub mod progress;
pub mod queue;
pub mod state;

pub use job::ScanJob;
pub use progress::{ProgressReport, ProgressTracker};
pub use queue::{retry_delay, retry_warning_due, ScanQueue};
pub use state::{ScanActivity, ScanState};
