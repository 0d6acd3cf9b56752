#![cfg(test)]

use crate::db::connection::Database;
use anyhow::Result;
use sea_orm::DatabaseConnection as SeaOrmConnection;
use std::sync::Arc;
use tempfile::TempDir;

/// Test database wrapper that handles setup and teardown
pub struct TestDatabase {
    pub connection: Arc<SeaOrmConnection>,
    _temp_dir: TempDir,
}

impl TestDatabase {
    /// Create a new test database with migrations
    pub async fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("test.db");

        let db = Database::connect(&db_path).await?;
        db.migrate().await?;

        Ok(Self {
            connection: db.shared(),
            _temp_dir: temp_dir,
        })
    }

    pub fn connection(&self) -> Arc<SeaOrmConnection> {
        self.connection.clone()
    }
}

/// Common test utilities
pub mod common {
    use std::future::Future;
    use std::time::Duration;
    use tokio::time::sleep;

    /// Wait for an async condition to become true
    pub async fn wait_for_async<F, Fut>(mut condition: F, max_wait: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < max_wait {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }

        false
    }
}

/// In-memory fakes of the download collaborators
pub mod fakes {
    use crate::downloads::{
        ByteStream, ContentFetch, CredentialProvider, FetchResponse, JobStore, MediaRecordStore,
        StatusReporter,
    };
    use crate::models::{DownloadId, DownloadJob, DownloadStatus, MediaItem, MediaItemId};
    use crate::storage::FilesystemStats;
    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::StreamExt;
    use std::collections::HashMap;
    use std::io;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// `(progress, downloaded_bytes, total_bytes)` as written by the executor
    pub type ProgressWrite = (f64, u64, u64);

    #[derive(Default)]
    pub struct MemoryJobStore {
        jobs: Mutex<HashMap<DownloadId, DownloadJob>>,
        progress_writes: Mutex<Vec<ProgressWrite>>,
        pub fail_progress_writes: AtomicBool,
    }

    impl MemoryJobStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, job: DownloadJob) {
            self.jobs.lock().unwrap().insert(job.id.clone(), job);
        }

        pub fn job(&self, id: &str) -> DownloadJob {
            self.jobs
                .lock()
                .unwrap()
                .get(&DownloadId::new(id))
                .cloned()
                .expect("job not in store")
        }

        pub fn progress_writes(&self) -> Vec<ProgressWrite> {
            self.progress_writes.lock().unwrap().clone()
        }

        fn modify(&self, id: &DownloadId, f: impl FnOnce(&mut DownloadJob)) -> Result<()> {
            let mut jobs = self.jobs.lock().unwrap();
            match jobs.get_mut(id) {
                Some(job) => {
                    f(job);
                    Ok(())
                }
                None => bail!("No job {}", id),
            }
        }
    }

    #[async_trait]
    impl JobStore for MemoryJobStore {
        async fn get_job(&self, id: &DownloadId) -> Result<Option<DownloadJob>> {
            Ok(self.jobs.lock().unwrap().get(id).cloned())
        }

        async fn update_status(&self, id: &DownloadId, status: DownloadStatus) -> Result<()> {
            self.modify(id, |job| job.status = status)
        }

        async fn update_progress(
            &self,
            id: &DownloadId,
            progress: f64,
            downloaded_bytes: u64,
            total_bytes: u64,
        ) -> Result<()> {
            if self.fail_progress_writes.load(Ordering::SeqCst) {
                bail!("database is locked");
            }
            self.progress_writes
                .lock()
                .unwrap()
                .push((progress, downloaded_bytes, total_bytes));
            self.modify(id, |job| {
                job.progress = progress;
                job.downloaded_bytes = downloaded_bytes;
                job.total_bytes = total_bytes;
            })
        }

        async fn mark_failed(&self, id: &DownloadId, message: &str) -> Result<()> {
            self.modify(id, |job| {
                job.status = DownloadStatus::Failed;
                job.last_error = Some(message.to_string());
            })
        }

        async fn complete_download(
            &self,
            id: &DownloadId,
            status: DownloadStatus,
            file_path: &str,
        ) -> Result<()> {
            self.modify(id, |job| {
                job.status = status;
                job.file_path = Some(file_path.to_string());
                job.progress = 1.0;
                job.last_error = None;
            })
        }

        async fn requeue(&self, id: &DownloadId) -> Result<()> {
            self.modify(id, |job| {
                job.status = DownloadStatus::Pending;
                job.attempt_count += 1;
            })
        }
    }

    #[derive(Default)]
    pub struct MemoryMediaStore {
        items: Mutex<HashMap<MediaItemId, MediaItem>>,
    }

    impl MemoryMediaStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, item: MediaItem) {
            self.items.lock().unwrap().insert(item.id.clone(), item);
        }

        pub fn item(&self, id: &str) -> MediaItem {
            self.items
                .lock()
                .unwrap()
                .get(&MediaItemId::new(id))
                .cloned()
                .expect("media item not in store")
        }
    }

    #[async_trait]
    impl MediaRecordStore for MemoryMediaStore {
        async fn get_by_id(&self, id: &MediaItemId) -> Result<Option<MediaItem>> {
            Ok(self.items.lock().unwrap().get(id).cloned())
        }

        async fn update(&self, item: &MediaItem) -> Result<()> {
            let mut items = self.items.lock().unwrap();
            if !items.contains_key(&item.id) {
                bail!("No media item {}", item.id);
            }
            items.insert(item.id.clone(), item.clone());
            Ok(())
        }

        async fn update_download_flag(
            &self,
            id: &MediaItemId,
            is_downloaded: bool,
            file_path: Option<&str>,
        ) -> Result<()> {
            let mut items = self.items.lock().unwrap();
            match items.get_mut(id) {
                Some(item) => {
                    item.is_downloaded = is_downloaded;
                    item.local_file_path = file_path.map(str::to_string);
                    Ok(())
                }
                None => bail!("No media item {}", id),
            }
        }
    }

    pub struct StaticCredentials {
        server_url: Option<String>,
        auth_token: Option<String>,
    }

    impl StaticCredentials {
        pub fn new(server_url: &str, auth_token: &str) -> Self {
            Self {
                server_url: Some(server_url.to_string()),
                auth_token: Some(auth_token.to_string()),
            }
        }

        pub fn missing() -> Self {
            Self {
                server_url: None,
                auth_token: None,
            }
        }

        pub fn without_token(server_url: &str) -> Self {
            Self {
                server_url: Some(server_url.to_string()),
                auth_token: Some("   ".to_string()),
            }
        }
    }

    #[async_trait]
    impl CredentialProvider for StaticCredentials {
        async fn server_url(&self) -> Result<Option<String>> {
            Ok(self.server_url.clone())
        }

        async fn auth_token(&self) -> Result<Option<String>> {
            Ok(self.auth_token.clone())
        }
    }

    /// Content fetch that replays a canned response on every call
    pub struct ScriptedFetch {
        status: u16,
        body: Vec<u8>,
        chunk_size: usize,
        content_length: Option<u64>,
        fail_after: Option<usize>,
        stall_after: Option<usize>,
        refuse: bool,
        pub calls: AtomicUsize,
        pub requests: Mutex<Vec<(String, String, String)>>,
    }

    impl ScriptedFetch {
        pub fn ok(body: Vec<u8>, chunk_size: usize) -> Self {
            Self {
                status: 200,
                content_length: Some(body.len() as u64),
                body,
                chunk_size,
                fail_after: None,
                stall_after: None,
                refuse: false,
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn status(status: u16) -> Self {
            let mut fetch = Self::ok(Vec::new(), 1);
            fetch.status = status;
            fetch.content_length = None;
            fetch
        }

        /// Connection refused before any response
        pub fn refused() -> Self {
            let mut fetch = Self::ok(Vec::new(), 1);
            fetch.refuse = true;
            fetch
        }

        pub fn with_content_length(mut self, content_length: Option<u64>) -> Self {
            self.content_length = content_length;
            self
        }

        /// Break the body with a connection reset after `bytes`
        pub fn failing_after(mut self, bytes: usize) -> Self {
            self.fail_after = Some(bytes);
            self
        }

        /// Deliver `bytes` and then never produce another chunk
        pub fn stalling_after(mut self, bytes: usize) -> Self {
            self.stall_after = Some(bytes);
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn body_stream(&self) -> ByteStream {
            let cut = self
                .fail_after
                .or(self.stall_after)
                .unwrap_or(self.body.len())
                .min(self.body.len());
            let mut chunks: Vec<io::Result<Bytes>> = self.body[..cut]
                .chunks(self.chunk_size.max(1))
                .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
                .collect();

            if self.fail_after.is_some() {
                chunks.push(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                )));
            }

            let stream = futures::stream::iter(chunks);
            if self.stall_after.is_some() {
                stream.chain(futures::stream::pending()).boxed()
            } else {
                stream.boxed()
            }
        }
    }

    #[async_trait]
    impl ContentFetch for ScriptedFetch {
        async fn fetch(
            &self,
            server_url: &str,
            content_id: &str,
            auth_token: &str,
        ) -> Result<FetchResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push((
                server_url.to_string(),
                content_id.to_string(),
                auth_token.to_string(),
            ));

            if self.refuse {
                bail!("error trying to connect: Connection refused");
            }

            Ok(FetchResponse {
                status: self.status,
                content_length: self.content_length,
                body: self.body_stream(),
            })
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum Reported {
        Progress(String, f64),
        Completed(String),
        Failed(String, String),
    }

    #[derive(Default)]
    pub struct RecordingReporter {
        reports: Mutex<Vec<Reported>>,
    }

    impl RecordingReporter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reports(&self) -> Vec<Reported> {
            self.reports.lock().unwrap().clone()
        }
    }

    impl StatusReporter for RecordingReporter {
        fn report_progress(&self, title: &str, progress: f64) {
            self.reports
                .lock()
                .unwrap()
                .push(Reported::Progress(title.to_string(), progress));
        }

        fn report_completed(&self, title: &str) {
            self.reports
                .lock()
                .unwrap()
                .push(Reported::Completed(title.to_string()));
        }

        fn report_failed(&self, title: &str, message: &str) {
            self.reports
                .lock()
                .unwrap()
                .push(Reported::Failed(title.to_string(), message.to_string()));
        }
    }

    /// Filesystem statistics pinned to fixed values
    pub struct FixedStats {
        pub available: u64,
        pub total: u64,
    }

    impl FixedStats {
        pub fn plenty() -> Self {
            Self {
                available: 100 * crate::config::GIB,
                total: 200 * crate::config::GIB,
            }
        }
    }

    impl FilesystemStats for FixedStats {
        fn available_space(&self, _path: &Path) -> io::Result<u64> {
            Ok(self.available)
        }

        fn total_space(&self, _path: &Path) -> io::Result<u64> {
            Ok(self.total)
        }
    }
}
