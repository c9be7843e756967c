//! # Asset Storage
//!
//! Flat on-disk layout for uploads and processed outputs:
//! - `<upload_dir>/<asset id>_<filename>` for raw uploads
//! - `<processed_dir>/processed_<job id>.wav` for pipeline outputs, with
//!   exports written next to them
//!
//! Nothing is deleted while the server runs. Files older than the configured
//! age are swept once at startup.

use crate::config::StorageConfig;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct AssetStore {
    upload_dir: PathBuf,
    processed_dir: PathBuf,
}

impl AssetStore {
    pub fn new(upload_dir: impl Into<PathBuf>, processed_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            processed_dir: processed_dir.into(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.upload_dir, &config.processed_dir)
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn processed_dir(&self) -> &Path {
        &self.processed_dir
    }

    /// Create both storage directories if they are missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.upload_dir, &self.processed_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create storage directory {}", dir.display()))?;
        }
        Ok(())
    }

    /// Where an upload for `asset_id` is stored.
    pub fn upload_path(&self, asset_id: &str, filename: &str) -> PathBuf {
        self.upload_dir
            .join(format!("{}_{}", asset_id, sanitize_filename(filename)))
    }

    /// Write the raw upload bytes to disk.
    pub async fn save_upload(&self, asset_id: &str, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.upload_path(asset_id, filename);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to store upload {}", path.display()))?;
        debug!(asset_id, path = %path.display(), bytes = bytes.len(), "Stored upload");
        Ok(path)
    }

    /// Locate the stored upload for an asset id.
    pub async fn find_upload(&self, asset_id: &str) -> Result<Option<PathBuf>> {
        let prefix = format!("{}_", asset_id);
        let mut entries = match tokio::fs::read_dir(&self.upload_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to list upload directory {}", self.upload_dir.display())
                })
            }
        };

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                return Ok(Some(entry.path()));
            }
        }
        Ok(None)
    }

    /// Output location of a job.
    pub fn output_path(&self, job_id: &str) -> PathBuf {
        self.processed_dir.join(format!("processed_{}.wav", job_id))
    }

    /// Remove files in both directories last modified more than `max_age` ago.
    ///
    /// Returns the number of files removed. Entries that cannot be inspected
    /// or removed are logged and skipped.
    pub fn sweep_older_than(&self, max_age: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;

        for dir in [&self.upload_dir, &self.processed_dir] {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to list {}", dir.display()))
                }
            };

            for entry in entries.flatten() {
                let path = entry.path();
                let modified = match entry.metadata().and_then(|m| {
                    if m.is_file() {
                        m.modified().map(Some)
                    } else {
                        Ok(None)
                    }
                }) {
                    Ok(Some(modified)) => modified,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping unreadable file during sweep");
                        continue;
                    }
                };

                let age = now.duration_since(modified).unwrap_or_default();
                if age > max_age {
                    match std::fs::remove_file(&path) {
                        Ok(()) => removed += 1,
                        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove old file"),
                    }
                }
            }
        }

        Ok(removed)
    }
}

/// Reduce a client-supplied filename to a safe single path component.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
