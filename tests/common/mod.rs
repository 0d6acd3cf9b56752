use reel_offline::config::DownloadConfig;
use reel_offline::db::{CredentialRepository, Database, DownloadRepository, MediaRepository};
use reel_offline::downloads::{DownloadExecutor, HttpContentFetch};
use reel_offline::models::{DownloadJob, MediaItem};
use reel_offline::storage::StorageAccountant;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// SQLite-backed stores in a temp dir, seeded with media `m1` and job `d1`
pub struct TestContext {
    pub jobs: Arc<DownloadRepository>,
    pub media: Arc<MediaRepository>,
    pub credentials: Arc<CredentialRepository>,
    pub download_root: PathBuf,
    pub config: DownloadConfig,
    _temp_dir: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db = Database::connect(&temp_dir.path().join("downloads.db"))
            .await
            .expect("Failed to connect to test database");
        db.migrate().await.expect("Failed to run migrations");
        let connection = db.shared();

        let context = Self {
            jobs: Arc::new(DownloadRepository::new(connection.clone())),
            media: Arc::new(MediaRepository::new(connection.clone())),
            credentials: Arc::new(CredentialRepository::new(connection)),
            download_root: temp_dir.path().join("downloads"),
            config: DownloadConfig {
                retry_delay_secs: 0,
                ..Default::default()
            },
            _temp_dir: temp_dir,
        };
        context.seed_item("d1", "m1", "c1", "Counting Song").await;
        context
    }

    pub async fn seed_item(&self, job_id: &str, media_id: &str, content_id: &str, title: &str) {
        self.media
            .insert(&MediaItem::new(media_id, content_id, title))
            .await
            .expect("Failed to seed media item");
        self.jobs
            .insert(&DownloadJob::new(job_id, media_id))
            .await
            .expect("Failed to seed download job");
    }

    pub async fn sign_in(&self, server_url: &str, token: &str) {
        self.credentials.set("server_url", server_url).await.unwrap();
        self.credentials.set("auth_token", token).await.unwrap();
    }

    /// Executor over the real stores and HTTP client, without a space buffer
    pub fn executor(&self) -> DownloadExecutor {
        let storage =
            StorageAccountant::new(&self.download_root).with_thresholds(0, 0);
        DownloadExecutor::new(
            self.jobs.clone(),
            self.media.clone(),
            self.credentials.clone(),
            Arc::new(HttpContentFetch::new(&self.config).unwrap()),
            Arc::new(storage),
            &self.config,
        )
    }
}

pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 253) as u8).collect()
}
