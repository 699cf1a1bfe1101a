//! HTTP status surface for doubleplay-scanner
//!
//! Everything here reads point-in-time snapshots from the scan queue.

pub mod health;
pub mod scan;

pub use health::health_routes;
pub use scan::scan_routes;
