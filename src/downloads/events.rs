use std::path::PathBuf;
use tracing::{info, warn};

use super::progress::ProgressCheckpoint;
use super::traits::StatusReporter;
use crate::models::DownloadId;

/// Lifecycle notifications broadcast to in-process listeners
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    Started {
        job_id: DownloadId,
        title: String,
    },
    Progress(ProgressCheckpoint),
    Completed {
        job_id: DownloadId,
        file_path: PathBuf,
    },
    Failed {
        job_id: DownloadId,
        message: String,
        will_retry: bool,
    },
    Cancelled {
        job_id: DownloadId,
    },
}

impl DownloadEvent {
    pub fn job_id(&self) -> &DownloadId {
        match self {
            Self::Started { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Cancelled { job_id } => job_id,
            Self::Progress(checkpoint) => &checkpoint.job_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Completed { .. } | Self::Cancelled { .. } => true,
            Self::Failed { will_retry, .. } => !will_retry,
            _ => false,
        }
    }
}

/// Status reporter that only writes to the log, used when no host surface is attached
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusReporter;

impl StatusReporter for TracingStatusReporter {
    fn report_progress(&self, title: &str, progress: f64) {
        info!("Downloading '{}': {:.0}%", title, progress * 100.0);
    }

    fn report_completed(&self, title: &str) {
        info!("Download complete: '{}'", title);
    }

    fn report_failed(&self, title: &str, message: &str) {
        warn!("Download of '{}' failed: {}", title, message);
    }
}
