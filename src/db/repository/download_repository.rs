use super::{BaseRepository, ensure_updated};
use crate::db::entities::{DownloadJobActiveModel, DownloadJobEntity, download_jobs};
use crate::downloads::JobStore;
use crate::models::{DownloadId, DownloadJob, DownloadStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::debug;

/// SQLite-backed job store
#[derive(Debug, Clone)]
pub struct DownloadRepository {
    base: BaseRepository,
}

impl DownloadRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Queue a new job
    pub async fn insert(&self, job: &DownloadJob) -> Result<DownloadJob> {
        let now = Utc::now().naive_utc();
        let active_model = DownloadJobActiveModel {
            id: Set(job.id.to_string()),
            media_item_id: Set(job.media_item_id.to_string()),
            status: Set(job.status.as_db_str().to_string()),
            progress: Set(job.progress),
            downloaded_bytes: Set(job.downloaded_bytes as i64),
            total_bytes: Set(job.total_bytes as i64),
            file_path: Set(job.file_path.clone()),
            last_error: Set(job.last_error.clone()),
            attempt_count: Set(job.attempt_count as i32),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let model = active_model
            .insert(self.base.db.as_ref())
            .await
            .with_context(|| format!("Failed to insert download job {}", job.id))?;
        Ok(model.into())
    }

    /// Jobs in a given status, oldest first
    pub async fn find_by_status(&self, status: DownloadStatus) -> Result<Vec<DownloadJob>> {
        let models = DownloadJobEntity::find()
            .filter(download_jobs::Column::Status.eq(status.as_db_str()))
            .order_by_asc(download_jobs::Column::CreatedAt)
            .all(self.base.db.as_ref())
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    pub async fn find_all(&self) -> Result<Vec<DownloadJob>> {
        let models = DownloadJobEntity::find()
            .order_by_asc(download_jobs::Column::CreatedAt)
            .all(self.base.db.as_ref())
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    /// Jobs left `Downloading` by a crashed process go back to `Pending`
    pub async fn reset_interrupted(&self) -> Result<u64> {
        let result = DownloadJobEntity::update_many()
            .col_expr(
                download_jobs::Column::Status,
                Expr::value(DownloadStatus::Pending.as_db_str()),
            )
            .col_expr(
                download_jobs::Column::UpdatedAt,
                Expr::value(Utc::now().naive_utc()),
            )
            .filter(download_jobs::Column::Status.eq(DownloadStatus::Downloading.as_db_str()))
            .exec(self.base.db.as_ref())
            .await?;
        if result.rows_affected > 0 {
            debug!("Reset {} interrupted downloads", result.rows_affected);
        }
        Ok(result.rows_affected)
    }

    pub async fn delete(&self, id: &DownloadId) -> Result<bool> {
        let result = DownloadJobEntity::delete_by_id(id.to_string())
            .exec(self.base.db.as_ref())
            .await?;
        Ok(result.rows_affected > 0)
    }
}

#[async_trait]
impl JobStore for DownloadRepository {
    async fn get_job(&self, id: &DownloadId) -> Result<Option<DownloadJob>> {
        Ok(DownloadJobEntity::find_by_id(id.to_string())
            .one(self.base.db.as_ref())
            .await?
            .map(Into::into))
    }

    async fn update_status(&self, id: &DownloadId, status: DownloadStatus) -> Result<()> {
        debug!("Download {} -> {}", id, status);
        let result = DownloadJobEntity::update_many()
            .col_expr(download_jobs::Column::Status, Expr::value(status.as_db_str()))
            .col_expr(
                download_jobs::Column::UpdatedAt,
                Expr::value(Utc::now().naive_utc()),
            )
            .filter(download_jobs::Column::Id.eq(id.as_str()))
            .exec(self.base.db.as_ref())
            .await?;
        ensure_updated(result, "download_jobs", id.as_str())
    }

    async fn update_progress(
        &self,
        id: &DownloadId,
        progress: f64,
        downloaded_bytes: u64,
        total_bytes: u64,
    ) -> Result<()> {
        let result = DownloadJobEntity::update_many()
            .col_expr(download_jobs::Column::Progress, Expr::value(progress))
            .col_expr(
                download_jobs::Column::DownloadedBytes,
                Expr::value(downloaded_bytes as i64),
            )
            .col_expr(
                download_jobs::Column::TotalBytes,
                Expr::value(total_bytes as i64),
            )
            .col_expr(
                download_jobs::Column::UpdatedAt,
                Expr::value(Utc::now().naive_utc()),
            )
            .filter(download_jobs::Column::Id.eq(id.as_str()))
            .exec(self.base.db.as_ref())
            .await?;
        ensure_updated(result, "download_jobs", id.as_str())
    }

    async fn mark_failed(&self, id: &DownloadId, message: &str) -> Result<()> {
        let result = DownloadJobEntity::update_many()
            .col_expr(
                download_jobs::Column::Status,
                Expr::value(DownloadStatus::Failed.as_db_str()),
            )
            .col_expr(download_jobs::Column::LastError, Expr::value(message))
            .col_expr(
                download_jobs::Column::UpdatedAt,
                Expr::value(Utc::now().naive_utc()),
            )
            .filter(download_jobs::Column::Id.eq(id.as_str()))
            .exec(self.base.db.as_ref())
            .await?;
        ensure_updated(result, "download_jobs", id.as_str())
    }

    async fn complete_download(
        &self,
        id: &DownloadId,
        status: DownloadStatus,
        file_path: &str,
    ) -> Result<()> {
        let result = DownloadJobEntity::update_many()
            .col_expr(download_jobs::Column::Status, Expr::value(status.as_db_str()))
            .col_expr(download_jobs::Column::FilePath, Expr::value(file_path))
            .col_expr(download_jobs::Column::Progress, Expr::value(1.0_f64))
            .col_expr(
                download_jobs::Column::LastError,
                Expr::value(Option::<String>::None),
            )
            .col_expr(
                download_jobs::Column::UpdatedAt,
                Expr::value(Utc::now().naive_utc()),
            )
            .filter(download_jobs::Column::Id.eq(id.as_str()))
            .exec(self.base.db.as_ref())
            .await?;
        ensure_updated(result, "download_jobs", id.as_str())
    }

    async fn requeue(&self, id: &DownloadId) -> Result<()> {
        let result = DownloadJobEntity::update_many()
            .col_expr(
                download_jobs::Column::Status,
                Expr::value(DownloadStatus::Pending.as_db_str()),
            )
            .col_expr(
                download_jobs::Column::AttemptCount,
                Expr::col(download_jobs::Column::AttemptCount).add(1),
            )
            .col_expr(
                download_jobs::Column::UpdatedAt,
                Expr::value(Utc::now().naive_utc()),
            )
            .filter(download_jobs::Column::Id.eq(id.as_str()))
            .exec(self.base.db.as_ref())
            .await?;
        ensure_updated(result, "download_jobs", id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{CredentialRepository, MediaRepository};
    use crate::downloads::{CredentialProvider, MediaRecordStore};
    use crate::models::MediaItem;
    use crate::test_utils::TestDatabase;

    async fn seeded() -> (TestDatabase, DownloadRepository) {
        let db = TestDatabase::new().await.unwrap();
        MediaRepository::new(db.connection())
            .insert(&MediaItem::new("m1", "c1", "Cartoon"))
            .await
            .unwrap();
        let repo = DownloadRepository::new(db.connection());
        repo.insert(&DownloadJob::new("d1", "m1")).await.unwrap();
        (db, repo)
    }

    fn id() -> DownloadId {
        DownloadId::new("d1")
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let (_db, repo) = seeded().await;

        let job = repo.get_job(&id()).await.unwrap().unwrap();
        assert_eq!(job.status, DownloadStatus::Pending);
        assert_eq!(job.media_item_id.as_str(), "m1");
        assert!(repo.get_job(&DownloadId::new("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_progress_and_completion() {
        let (_db, repo) = seeded().await;

        repo.update_status(&id(), DownloadStatus::Downloading).await.unwrap();
        repo.update_progress(&id(), 0.5, 512, 1024).await.unwrap();
        let job = repo.get_job(&id()).await.unwrap().unwrap();
        assert_eq!(job.status, DownloadStatus::Downloading);
        assert_eq!(job.downloaded_bytes, 512);
        assert_eq!(job.total_bytes, 1024);

        repo.complete_download(&id(), DownloadStatus::Completed, "/data/m1.mp4")
            .await
            .unwrap();
        let job = repo.get_job(&id()).await.unwrap().unwrap();
        assert_eq!(job.status, DownloadStatus::Completed);
        assert_eq!(job.progress, 1.0);
        assert_eq!(job.file_path.as_deref(), Some("/data/m1.mp4"));
    }

    #[tokio::test]
    async fn test_mark_failed_then_requeue() {
        let (_db, repo) = seeded().await;

        repo.mark_failed(&id(), "connection reset").await.unwrap();
        let job = repo.get_job(&id()).await.unwrap().unwrap();
        assert_eq!(job.status, DownloadStatus::Failed);
        assert_eq!(job.last_error.as_deref(), Some("connection reset"));

        repo.requeue(&id()).await.unwrap();
        repo.requeue(&id()).await.unwrap();
        let job = repo.get_job(&id()).await.unwrap().unwrap();
        assert_eq!(job.status, DownloadStatus::Pending);
        assert_eq!(job.attempt_count, 2);
    }

    #[tokio::test]
    async fn test_updates_to_missing_job_fail() {
        let (_db, repo) = seeded().await;
        let missing = DownloadId::new("missing");

        assert!(repo.update_status(&missing, DownloadStatus::Failed).await.is_err());
        assert!(repo.requeue(&missing).await.is_err());
    }

    #[tokio::test]
    async fn test_find_by_status_and_reset_interrupted() {
        let (_db, repo) = seeded().await;
        repo.insert(&DownloadJob::new("d2", "m1")).await.unwrap();
        repo.update_status(&DownloadId::new("d2"), DownloadStatus::Downloading)
            .await
            .unwrap();

        assert_eq!(repo.find_by_status(DownloadStatus::Pending).await.unwrap().len(), 1);
        assert_eq!(repo.reset_interrupted().await.unwrap(), 1);
        assert_eq!(repo.find_by_status(DownloadStatus::Pending).await.unwrap().len(), 2);

        assert!(repo.delete(&id()).await.unwrap());
        assert_eq!(repo.find_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_media_flag_and_credentials() {
        let (db, _repo) = seeded().await;

        let media = MediaRepository::new(db.connection());
        let media_id = crate::models::MediaItemId::new("m1");
        media
            .update_download_flag(&media_id, true, Some("/data/m1.mp4"))
            .await
            .unwrap();
        let item = media.get_by_id(&media_id).await.unwrap().unwrap();
        assert!(item.is_downloaded);
        assert_eq!(item.local_file_path.as_deref(), Some("/data/m1.mp4"));
        assert_eq!(media.find_downloaded().await.unwrap().len(), 1);

        let credentials = CredentialRepository::new(db.connection());
        assert!(credentials.auth_token().await.unwrap().is_none());
        credentials.set("auth_token", "first").await.unwrap();
        credentials.set("auth_token", "second").await.unwrap();
        assert_eq!(
            credentials.auth_token().await.unwrap().as_deref(),
            Some("second")
        );
        assert!(credentials.delete("auth_token").await.unwrap());
    }
}
