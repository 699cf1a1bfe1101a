//! Collaborators of the scan queue
//!
//! - Upstream playlist client (fetch plays, show enrichment, health)
//! - Dataset persistence
//! - Off-site backup mirror

pub mod backup;
pub mod playlist_client;
pub mod storage;

pub use backup::{BackupSink, MirrorBackup, NoBackup};
pub use playlist_client::{HttpPlaylistClient, PlaylistSource, UpstreamHealth};
pub use storage::{DatasetStore, JsonFileStore};
