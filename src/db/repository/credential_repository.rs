use super::BaseRepository;
use crate::db::entities::{AppCredential, AppCredentialActiveModel, app_credentials};
use crate::downloads::CredentialProvider;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, Set};
use std::sync::Arc;

pub const SERVER_URL_KEY: &str = "server_url";
pub const AUTH_TOKEN_KEY: &str = "auth_token";

/// Credentials persisted by the login flow
#[derive(Debug, Clone)]
pub struct CredentialRepository {
    base: BaseRepository,
}

impl CredentialRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(AppCredential::find_by_id(key.to_string())
            .one(self.base.db.as_ref())
            .await?
            .map(|model| model.value))
    }

    /// Upsert a credential value
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let active_model = AppCredentialActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            updated_at: Set(Utc::now().naive_utc()),
        };

        AppCredential::insert(active_model)
            .on_conflict(
                OnConflict::column(app_credentials::Column::Key)
                    .update_columns([
                        app_credentials::Column::Value,
                        app_credentials::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(self.base.db.as_ref())
            .await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        let result = AppCredential::delete_by_id(key.to_string())
            .exec(self.base.db.as_ref())
            .await?;
        Ok(result.rows_affected > 0)
    }
}

#[async_trait]
impl CredentialProvider for CredentialRepository {
    async fn server_url(&self) -> Result<Option<String>> {
        self.get(SERVER_URL_KEY).await
    }

    async fn auth_token(&self) -> Result<Option<String>> {
        self.get(AUTH_TOKEN_KEY).await
    }
}
