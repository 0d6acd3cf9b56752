use super::{BaseRepository, ensure_updated};
use crate::db::entities::{MediaItemActiveModel, MediaItemEntity, media_items};
use crate::downloads::MediaRecordStore;
use crate::models::{MediaItem, MediaItemId};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::sync::Arc;

/// SQLite-backed media record store
#[derive(Debug, Clone)]
pub struct MediaRepository {
    base: BaseRepository,
}

impl MediaRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    fn active_model(item: &MediaItem) -> MediaItemActiveModel {
        MediaItemActiveModel {
            id: Set(item.id.to_string()),
            remote_content_id: Set(item.remote_content_id.clone()),
            title: Set(item.title.clone()),
            is_downloaded: Set(item.is_downloaded),
            download_progress: Set(item.download_progress),
            local_file_path: Set(item.local_file_path.clone()),
            updated_at: Set(Utc::now().naive_utc()),
        }
    }

    pub async fn insert(&self, item: &MediaItem) -> Result<MediaItem> {
        let model = Self::active_model(item)
            .insert(self.base.db.as_ref())
            .await
            .with_context(|| format!("Failed to insert media item {}", item.id))?;
        Ok(model.into())
    }

    /// Items whose download finished, for the offline library screen
    pub async fn find_downloaded(&self) -> Result<Vec<MediaItem>> {
        let models = MediaItemEntity::find()
            .filter(media_items::Column::IsDownloaded.eq(true))
            .all(self.base.db.as_ref())
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl MediaRecordStore for MediaRepository {
    async fn get_by_id(&self, id: &MediaItemId) -> Result<Option<MediaItem>> {
        Ok(MediaItemEntity::find_by_id(id.to_string())
            .one(self.base.db.as_ref())
            .await?
            .map(Into::into))
    }

    async fn update(&self, item: &MediaItem) -> Result<()> {
        Self::active_model(item)
            .update(self.base.db.as_ref())
            .await
            .with_context(|| format!("Failed to update media item {}", item.id))?;
        Ok(())
    }

    async fn update_download_flag(
        &self,
        id: &MediaItemId,
        is_downloaded: bool,
        file_path: Option<&str>,
    ) -> Result<()> {
        let result = MediaItemEntity::update_many()
            .col_expr(media_items::Column::IsDownloaded, Expr::value(is_downloaded))
            .col_expr(
                media_items::Column::LocalFilePath,
                Expr::value(file_path.map(str::to_string)),
            )
            .col_expr(
                media_items::Column::UpdatedAt,
                Expr::value(Utc::now().naive_utc()),
            )
            .filter(media_items::Column::Id.eq(id.as_str()))
            .exec(self.base.db.as_ref())
            .await?;
        ensure_updated(result, "media_items", id.as_str())
    }
}
