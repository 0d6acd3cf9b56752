use serde::{Deserialize, Serialize};

use crate::models::DownloadId;

/// Persisted progress snapshot of a running download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressCheckpoint {
    pub job_id: DownloadId,
    pub progress: f64,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
}

/// Decides which chunk boundaries become checkpoints
///
/// A checkpoint is taken when progress advanced at least `step` since the
/// previous one, or once progress reaches `finish`. Checkpoints are strictly
/// increasing in downloaded bytes.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    job_id: DownloadId,
    step: f64,
    finish: f64,
    last_progress: f64,
    last_bytes: Option<u64>,
}

impl ProgressThrottle {
    pub fn new(job_id: DownloadId, step: f64, finish: f64) -> Self {
        Self {
            job_id,
            step,
            finish,
            last_progress: 0.0,
            last_bytes: None,
        }
    }

    /// Fraction of the body received, zero while the size is unknown
    pub fn progress_of(downloaded_bytes: u64, total_bytes: u64) -> f64 {
        if total_bytes == 0 {
            return 0.0;
        }
        (downloaded_bytes as f64 / total_bytes as f64).min(1.0)
    }

    /// Record a chunk boundary, returning a checkpoint when one is due
    pub fn observe(&mut self, downloaded_bytes: u64, total_bytes: u64) -> Option<ProgressCheckpoint> {
        if !self.is_new(downloaded_bytes) {
            return None;
        }

        let progress = Self::progress_of(downloaded_bytes, total_bytes);
        if progress - self.last_progress >= self.step || progress >= self.finish {
            Some(self.take(progress, downloaded_bytes, total_bytes))
        } else {
            None
        }
    }

    /// Closing checkpoint with `downloaded == total` and progress 1.0
    ///
    /// Returns `None` when a checkpoint already covers these bytes.
    pub fn finish(&mut self, downloaded_bytes: u64) -> Option<ProgressCheckpoint> {
        if !self.is_new(downloaded_bytes) {
            return None;
        }
        Some(self.take(1.0, downloaded_bytes, downloaded_bytes))
    }

    pub fn last_progress(&self) -> f64 {
        self.last_progress
    }

    fn is_new(&self, downloaded_bytes: u64) -> bool {
        self.last_bytes.is_none_or(|last| downloaded_bytes > last)
    }

    fn take(&mut self, progress: f64, downloaded_bytes: u64, total_bytes: u64) -> ProgressCheckpoint {
        self.last_progress = progress;
        self.last_bytes = Some(downloaded_bytes);
        ProgressCheckpoint {
            job_id: self.job_id.clone(),
            progress,
            downloaded_bytes,
            total_bytes,
        }
    }
}
