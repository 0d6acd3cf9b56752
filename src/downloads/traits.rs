use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::models::{DownloadId, DownloadJob, DownloadStatus, MediaItem, MediaItemId};

/// Durable download records; every call is atomic on its own
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get_job(&self, id: &DownloadId) -> Result<Option<DownloadJob>>;

    async fn update_status(&self, id: &DownloadId, status: DownloadStatus) -> Result<()>;

    async fn update_progress(
        &self,
        id: &DownloadId,
        progress: f64,
        downloaded_bytes: u64,
        total_bytes: u64,
    ) -> Result<()>;

    /// Set `Failed` and record the message as `last_error`
    async fn mark_failed(&self, id: &DownloadId, message: &str) -> Result<()>;

    async fn complete_download(
        &self,
        id: &DownloadId,
        status: DownloadStatus,
        file_path: &str,
    ) -> Result<()>;

    /// Put a failed job back to `Pending` and count the spent attempt
    async fn requeue(&self, id: &DownloadId) -> Result<()>;
}

#[async_trait]
pub trait MediaRecordStore: Send + Sync {
    async fn get_by_id(&self, id: &MediaItemId) -> Result<Option<MediaItem>>;

    async fn update(&self, item: &MediaItem) -> Result<()>;

    async fn update_download_flag(
        &self,
        id: &MediaItemId,
        is_downloaded: bool,
        file_path: Option<&str>,
    ) -> Result<()>;
}

/// Pre-resolved server location and bearer token
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn server_url(&self) -> Result<Option<String>>;

    async fn auth_token(&self) -> Result<Option<String>>;
}

pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Response head plus a lazily consumed body
pub struct FetchResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl std::fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait ContentFetch: Send + Sync {
    async fn fetch(
        &self,
        server_url: &str,
        content_id: &str,
        auth_token: &str,
    ) -> Result<FetchResponse>;
}

/// Foreground-visible status, fire and forget
pub trait StatusReporter: Send + Sync {
    fn report_progress(&self, title: &str, progress: f64);

    fn report_completed(&self, title: &str);

    fn report_failed(&self, _title: &str, _message: &str) {}
}
