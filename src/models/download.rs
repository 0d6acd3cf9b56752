use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::{DownloadId, MediaItemId};

/// Lifecycle of a download job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Queued, waiting for an executor
    Pending,
    /// An executor is streaming data
    Downloading,
    /// File fully written and recorded
    Completed,
    /// Last attempt failed; terminal unless requeued
    Failed,
    /// Removed by the user while queued or running
    Cancelled,
}

impl DownloadStatus {
    /// Convert to string for database storage
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse from database string, unknown values fall back to `Pending`
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "downloading" => Self::Downloading,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            _ => Self::Pending,
        }
    }

    /// Check if download is active
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Downloading)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// Working copy of a download record owned by the job store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadJob {
    pub id: DownloadId,
    pub media_item_id: MediaItemId,
    pub status: DownloadStatus,
    /// Fraction in `[0, 1]`
    pub progress: f64,
    pub downloaded_bytes: u64,
    /// Zero when the size is unknown
    pub total_bytes: u64,
    pub file_path: Option<String>,
    pub last_error: Option<String>,
    pub attempt_count: u32,
}

impl DownloadJob {
    pub fn new(id: impl Into<DownloadId>, media_item_id: impl Into<MediaItemId>) -> Self {
        Self {
            id: id.into(),
            media_item_id: media_item_id.into(),
            status: DownloadStatus::Pending,
            progress: 0.0,
            downloaded_bytes: 0,
            total_bytes: 0,
            file_path: None,
            last_error: None,
            attempt_count: 0,
        }
    }
}

/// Media fields the download core reads and mirrors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: MediaItemId,
    pub remote_content_id: String,
    pub title: String,
    pub is_downloaded: bool,
    pub download_progress: f64,
    pub local_file_path: Option<String>,
}

impl MediaItem {
    pub fn new(
        id: impl Into<MediaItemId>,
        remote_content_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            remote_content_id: remote_content_id.into(),
            title: title.into(),
            is_downloaded: false,
            download_progress: 0.0,
            local_file_path: None,
        }
    }

    /// A downloaded item must point at a file that still exists
    pub fn has_local_file(&self) -> bool {
        self.local_file_path
            .as_deref()
            .is_some_and(|path| !path.is_empty() && std::path::Path::new(path).exists())
    }
}

/// Result handed back to whoever scheduled the job
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    Success { file_path: PathBuf },
    /// Transient failure; the job was put back to `Pending`
    Retry { message: String },
    /// Terminal failure, the message is what the user sees
    Failure { message: String },
    Cancelled,
}

impl DownloadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn should_retry(&self) -> bool {
        matches!(self, Self::Retry { .. })
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Retry { message } | Self::Failure { message } => Some(message),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_db_round_trip() {
        for status in [
            DownloadStatus::Pending,
            DownloadStatus::Downloading,
            DownloadStatus::Completed,
            DownloadStatus::Failed,
            DownloadStatus::Cancelled,
        ] {
            assert_eq!(DownloadStatus::from_db_str(status.as_db_str()), status);
        }
        assert_eq!(DownloadStatus::from_db_str("garbage"), DownloadStatus::Pending);
    }

    #[test]
    fn test_new_job_defaults() {
        let job = DownloadJob::new("d1", "m1");
        assert_eq!(job.status, DownloadStatus::Pending);
        assert_eq!(job.attempt_count, 0);
        assert_eq!(job.total_bytes, 0);
        assert!(job.file_path.is_none());
    }

    #[test]
    fn test_media_local_file_requires_existing_path() {
        let mut item = MediaItem::new("m1", "c1", "Cartoon");
        assert!(!item.has_local_file());

        item.local_file_path = Some("/definitely/not/here.mp4".to_string());
        assert!(!item.has_local_file());

        let file = tempfile::NamedTempFile::new().unwrap();
        item.local_file_path = Some(file.path().to_string_lossy().into_owned());
        assert!(item.has_local_file());
    }

    #[test]
    fn test_outcome_message() {
        let outcome = DownloadOutcome::Failure {
            message: "HTTP error: 404".to_string(),
        };
        assert_eq!(outcome.message(), Some("HTTP error: 404"));
        assert!(!outcome.should_retry());
        assert!(DownloadOutcome::Cancelled.message().is_none());
    }
}
