//! Off-site backup of the saved dataset
//!
//! Backups are opportunistic: the scan queue fires them after a successful
//! save and never waits on or fails because of them.

use async_trait::async_trait;
use doubleplay_common::Result;
use std::path::{Path, PathBuf};

/// Mirror the freshly saved dataset file somewhere else
#[async_trait]
pub trait BackupSink: Send + Sync {
    async fn backup(&self, dataset_path: &Path) -> Result<()>;
}

/// No backup configured
#[derive(Debug, Clone, Default)]
pub struct NoBackup;

#[async_trait]
impl BackupSink for NoBackup {
    async fn backup(&self, _dataset_path: &Path) -> Result<()> {
        Ok(())
    }
}

/// Copies the dataset file into a mirror folder
#[derive(Debug, Clone)]
pub struct MirrorBackup {
    folder: PathBuf,
}

impl MirrorBackup {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }
}

#[async_trait]
impl BackupSink for MirrorBackup {
    async fn backup(&self, dataset_path: &Path) -> Result<()> {
        let file_name = dataset_path.file_name().ok_or_else(|| {
            doubleplay_common::Error::InvalidInput(format!(
                "dataset path {} has no file name",
                dataset_path.display()
            ))
        })?;

        tokio::fs::create_dir_all(&self.folder).await?;
        let target = self.folder.join(file_name);
        let bytes = tokio::fs::copy(dataset_path, &target).await?;

        tracing::debug!(target = %target.display(), bytes, "Dataset mirrored");
        Ok(())
    }
}
