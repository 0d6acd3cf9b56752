use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{DownloadConfig, DEFAULT_MIN_RESERVE_BYTES, DEFAULT_SPACE_BUFFER_BYTES};
use crate::models::MediaItemId;
use crate::utils::format_bytes;

/// Source of volume statistics for a path
pub trait FilesystemStats: Send + Sync {
    fn available_space(&self, path: &Path) -> io::Result<u64>;
    fn total_space(&self, path: &Path) -> io::Result<u64>;
}

/// Volume statistics from the OS (statvfs / GetDiskFreeSpaceEx)
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFilesystemStats;

impl FilesystemStats for OsFilesystemStats {
    fn available_space(&self, path: &Path) -> io::Result<u64> {
        fs2::available_space(path)
    }

    fn total_space(&self, path: &Path) -> io::Result<u64> {
        fs2::total_space(path)
    }
}

/// Point-in-time view of the download volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSnapshot {
    pub available_bytes: u64,
    pub total_bytes: u64,
    pub used_by_downloads: u64,
}

impl StorageSnapshot {
    /// Share of the volume taken by downloads, 0-100
    pub fn usage_percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.used_by_downloads as f64 / self.total_bytes as f64) * 100.0
    }

    pub fn free_percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.available_bytes as f64 / self.total_bytes as f64) * 100.0
    }
}

/// Space accounting for the managed download directory
///
/// Filesystem errors never escape: statistics degrade to zero and deletions
/// to `false`/`0`, so callers fail closed.
pub struct StorageAccountant {
    root: PathBuf,
    stats: Arc<dyn FilesystemStats>,
    space_buffer_bytes: u64,
    min_reserve_bytes: u64,
}

impl StorageAccountant {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            stats: Arc::new(OsFilesystemStats),
            space_buffer_bytes: DEFAULT_SPACE_BUFFER_BYTES,
            min_reserve_bytes: DEFAULT_MIN_RESERVE_BYTES,
        }
    }

    pub fn from_config(config: &DownloadConfig) -> anyhow::Result<Self> {
        Ok(Self::new(config.download_directory()?)
            .with_thresholds(config.space_buffer_bytes, config.min_reserve_bytes))
    }

    pub fn with_stats(mut self, stats: Arc<dyn FilesystemStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_thresholds(mut self, space_buffer_bytes: u64, min_reserve_bytes: u64) -> Self {
        self.space_buffer_bytes = space_buffer_bytes;
        self.min_reserve_bytes = min_reserve_bytes;
        self
    }

    /// Download root, created on first access
    pub fn download_root(&self) -> io::Result<&Path> {
        if !self.root.is_dir() {
            fs::create_dir_all(&self.root)?;
            info!("Created download directory {:?}", self.root);
        }
        Ok(&self.root)
    }

    /// Destination file for a media item
    ///
    /// Bytes outside `[A-Za-z0-9-]`, `_` included, are written as `_xx` hex so
    /// distinct ids never share a file.
    pub fn file_path_for(&self, media_id: &MediaItemId) -> PathBuf {
        let mut name = String::with_capacity(media_id.as_str().len());
        for byte in media_id.as_str().bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                name.push(byte as char);
            } else {
                name.push_str(&format!("_{:02x}", byte));
            }
        }
        self.root.join(format!("{}.mp4", name))
    }

    pub fn available_bytes(&self) -> u64 {
        let available = self.query(|stats, root| stats.available_space(root), "available");
        match self.query(|stats, root| stats.total_space(root), "total") {
            0 => available,
            total => available.min(total),
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.query(|stats, root| stats.total_space(root), "total")
    }

    fn query<F>(&self, f: F, what: &str) -> u64
    where
        F: FnOnce(&dyn FilesystemStats, &Path) -> io::Result<u64>,
    {
        let result = self
            .download_root()
            .and_then(|root| f(self.stats.as_ref(), root));

        match result {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    "Failed to read {} space for {:?}, assuming none: {}",
                    what, self.root, e
                );
                0
            }
        }
    }

    /// Sum of all file sizes below the download root
    pub fn used_by_downloads(&self) -> u64 {
        if !self.root.exists() {
            return 0;
        }
        directory_size(&self.root)
    }

    /// True if `required_bytes` fit while keeping the buffer free
    pub fn has_enough_space(&self, required_bytes: u64) -> bool {
        let available = self.available_bytes();
        let needed = required_bytes.saturating_add(self.space_buffer_bytes);
        let enough = available >= needed;

        if !enough {
            debug!(
                "Not enough space: need {} (+{} buffer), {} available",
                format_bytes(required_bytes),
                format_bytes(self.space_buffer_bytes),
                format_bytes(available)
            );
        }
        enough
    }

    /// Device-health signal, independent of any pending download
    pub fn is_storage_low(&self) -> bool {
        self.available_bytes() < self.min_reserve_bytes
    }

    pub fn snapshot(&self) -> StorageSnapshot {
        StorageSnapshot {
            available_bytes: self.available_bytes(),
            total_bytes: self.total_bytes(),
            used_by_downloads: self.used_by_downloads(),
        }
    }

    /// Remove one file; `false` when it was missing or could not be removed
    pub fn delete_file(&self, path: &Path) -> bool {
        match fs::remove_file(path) {
            Ok(()) => {
                debug!("Deleted download file {:?}", path);
                true
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                error!("Failed to delete download file {:?}: {}", path, e);
                false
            }
        }
    }

    /// Remove every file below the download root, returns how many went away
    pub fn delete_all(&self) -> usize {
        if !self.root.exists() {
            return 0;
        }

        let mut files = Vec::new();
        collect_files(&self.root, &mut files);
        let deleted = files.iter().filter(|path| self.delete_file(path)).count();

        info!(
            "Deleted {} of {} files under {:?}",
            deleted,
            files.len(),
            self.root
        );
        deleted
    }
}

fn directory_size(dir: &Path) -> u64 {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to read directory {:?}: {}", dir, e);
            return 0;
        }
    };

    entries
        .flatten()
        .map(|entry| match entry.file_type() {
            Ok(kind) if kind.is_dir() => directory_size(&entry.path()),
            Ok(kind) if kind.is_file() => entry.metadata().map(|m| m.len()).unwrap_or(0),
            _ => 0,
        })
        .sum()
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to read directory {:?}: {}", dir, e);
            return;
        }
    };

    for entry in entries.flatten() {
        match entry.file_type() {
            Ok(kind) if kind.is_dir() => collect_files(&entry.path(), files),
            Ok(kind) if kind.is_file() => files.push(entry.path()),
            _ => {}
        }
    }
}
