use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::MediaItem;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "media_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub remote_content_id: String,
    pub title: String,
    pub is_downloaded: bool,
    pub download_progress: f64,
    pub local_file_path: Option<String>,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::download_jobs::Entity")]
    DownloadJobs,
}

impl Related<super::download_jobs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DownloadJobs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for MediaItem {
    fn from(model: Model) -> Self {
        Self {
            id: model.id.into(),
            remote_content_id: model.remote_content_id,
            title: model.title,
            is_downloaded: model.is_downloaded,
            download_progress: model.download_progress,
            local_file_path: model.local_file_path,
        }
    }
}
