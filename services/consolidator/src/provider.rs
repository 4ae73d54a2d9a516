//! Snapshot sources.

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{debug, info};

use crate::pipeline::RawSnapshot;

/// Yields one batch of raw snapshots in the provider's own order.
pub trait SnapshotProvider {
    fn fetch_batch(&self) -> impl Future<Output = Result<Vec<RawSnapshot>>> + Send;
}

/// Workbook files already downloaded into a local directory, e.g.
/// `policia-estadisticas-138.xlsx`.
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    dir: PathBuf,
}

impl DirectoryProvider {
    pub const EXTENSIONS: [&'static str; 4] = ["xlsx", "xls", "xlsb", "ods"];

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn is_workbook(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| Self::EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }

    async fn workbook_paths(&self) -> Result<Vec<PathBuf>> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("Failed to read snapshot directory {}", self.dir.display()))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if Self::is_workbook(&path) {
                paths.push(path);
            } else {
                debug!(path = %path.display(), "ignoring non-workbook file");
            }
        }
        // Directory order is platform dependent.
        paths.sort();
        Ok(paths)
    }
}

impl SnapshotProvider for DirectoryProvider {
    async fn fetch_batch(&self) -> Result<Vec<RawSnapshot>> {
        let paths = self.workbook_paths().await?;
        let mut batch = Vec::with_capacity(paths.len());

        for path in paths {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let content = fs::read(&path)
                .await
                .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
            debug!(file = %filename, bytes = content.len(), "snapshot loaded");
            batch.push(RawSnapshot::new(filename, content));
        }

        info!(dir = %self.dir.display(), snapshots = batch.len(), "batch fetched");
        Ok(batch)
    }
}
