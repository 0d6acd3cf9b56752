use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::{DownloadJob, DownloadStatus};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "download_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub media_item_id: String,
    pub status: String, // 'pending', 'downloading', 'completed', 'failed', 'cancelled'
    pub progress: f64,
    pub downloaded_bytes: i64,
    pub total_bytes: i64,
    pub file_path: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub last_error: Option<String>,
    pub attempt_count: i32,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::media_items::Entity",
        from = "Column::MediaItemId",
        to = "super::media_items::Column::Id"
    )]
    MediaItem,
}

impl Related<super::media_items::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MediaItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for DownloadJob {
    fn from(model: Model) -> Self {
        Self {
            id: model.id.into(),
            media_item_id: model.media_item_id.into(),
            status: DownloadStatus::from_db_str(&model.status),
            progress: model.progress.clamp(0.0, 1.0),
            downloaded_bytes: model.downloaded_bytes.max(0) as u64,
            total_bytes: model.total_bytes.max(0) as u64,
            file_path: model.file_path,
            last_error: model.last_error,
            attempt_count: model.attempt_count.max(0) as u32,
        }
    }
}
