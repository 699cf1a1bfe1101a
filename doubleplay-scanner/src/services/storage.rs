//! Dataset persistence
//!
//! The dataset is a single JSON document. Saves validate the shape first and
//! refuse to write anything malformed; writes go to a temp file that is then
//! renamed over the previous version.

use async_trait::async_trait;
use chrono::Utc;
use doubleplay_common::{DatasetWindow, Error, Result};
use std::path::{Path, PathBuf};

/// Load/save contract used by the scan queue
#[async_trait]
pub trait DatasetStore: Send + Sync {
    /// Stored dataset, or an empty window over the last day when none exists
    async fn load(&self) -> Result<DatasetWindow>;

    /// Validate and persist; fails loudly on invalid data
    async fn save(&self, dataset: &DatasetWindow) -> Result<()>;

    /// File backing the store, if any; used for backups
    fn location(&self) -> Option<PathBuf> {
        None
    }
}

/// JSON file store
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl DatasetStore for JsonFileStore {
    async fn load(&self) -> Result<DatasetWindow> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    path = %self.path.display(),
                    "No dataset on disk, starting with an empty window"
                );
                return Ok(DatasetWindow::empty_default(Utc::now()));
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let mut dataset: DatasetWindow = serde_json::from_str(&content)?;
        dataset.sort_groups();
        dataset.validate()?;

        tracing::info!(
            path = %self.path.display(),
            groups = dataset.double_plays.len(),
            start = %dataset.start_date,
            end = %dataset.end_date,
            "Loaded dataset"
        );
        Ok(dataset)
    }

    async fn save(&self, dataset: &DatasetWindow) -> Result<()> {
        dataset.validate()?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_vec_pretty(dataset)?;
        let temp_path = self.temp_path();
        tokio::fs::write(&temp_path, &json).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        tracing::debug!(
            path = %self.path.display(),
            bytes = json.len(),
            groups = dataset.double_plays.len(),
            "Dataset saved"
        );
        Ok(())
    }

    fn location(&self) -> Option<PathBuf> {
        Some(self.path.clone())
    }
}
