//! # Double Play Common Library
//!
//! Shared code for the double play tracker:
//! - Play, group and dataset models
//! - Event types (DoublePlayEvent enum) and the EventBus
//! - Configuration file resolution
//! - Time and human-readable duration helpers

pub mod config;
pub mod error;
pub mod events;
pub mod human_time;
pub mod models;
pub mod time;

pub use error::{Error, Result};
pub use models::{
    Classification, ClassificationCounts, DatasetWindow, DoublePlayGroup, DoublePlayOccurrence,
    PlayEvent, PlayKind, ScanDirection,
};
