use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::types::Snapshot;

pub const DEFAULT_STORE_PATH: &str = "build/data.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to read snapshot {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("Failed to write snapshot {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("Snapshot {} is not valid: {source}", .path.display())]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The last good snapshot on disk, plus an optional directory of superseded copies.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
    archive_dir: Option<PathBuf>,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            archive_dir: None,
        }
    }

    pub fn with_archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = Some(dir.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored snapshot. `Ok(None)` when nothing has been stored yet.
    pub fn load(&self) -> Result<Option<Snapshot>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::info!("No stored snapshot at {}", self.path.display());
                return Ok(None);
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let snapshot = serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(snapshot))
    }

    /// Replaces the stored snapshot. The new document is written beside the old one
    /// and renamed over it, so readers never see a partial file.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let json = serde_json::to_vec(snapshot)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| self.write_error(source))?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(|source| self.write_error(source))?;
        fs::rename(&tmp_path, &self.path).map_err(|source| self.write_error(source))?;

        log::info!(
            "Stored {} region(s) at {}",
            snapshot.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Copies the current artifact to `<archive_dir>/<stem>-<unix seconds>.json`.
    ///
    /// Best-effort: returns the archive path on success, logs and returns `None` otherwise.
    pub fn archive(&self, at: DateTime<Utc>) -> Option<PathBuf> {
        let dir = self.archive_dir.as_ref()?;
        if !self.path.exists() {
            return None;
        }

        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("snapshot");
        let target = dir.join(format!("{}-{}.json", stem, at.timestamp()));

        let copied = fs::create_dir_all(dir).and_then(|_| fs::copy(&self.path, &target));
        match copied {
            Ok(_) => {
                log::info!("Archived previous snapshot to {}", target.display());
                Some(target)
            }
            Err(e) => {
                log::warn!("Failed to archive snapshot to {}: {}", target.display(), e);
                None
            }
        }
    }

    /// Archives the previous artifact when `changed`, then saves `snapshot`.
    pub fn persist(&self, snapshot: &Snapshot, changed: bool) -> Result<(), StoreError> {
        if changed {
            self.archive(Utc::now());
        }
        self.save(snapshot)
    }

    fn write_error(&self, source: io::Error) -> StoreError {
        StoreError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_PATH)
    }
}
