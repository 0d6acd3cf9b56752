pub mod credential_repository;
pub mod download_repository;
pub mod media_repository;

use anyhow::{Result, anyhow};
use sea_orm::{DatabaseConnection, UpdateResult};
use std::sync::Arc;

/// Base repository implementation holder
#[derive(Debug, Clone)]
pub struct BaseRepository {
    pub db: Arc<DatabaseConnection>,
}

impl BaseRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

/// Turn a zero-row update into an error naming the missing record
pub(crate) fn ensure_updated(result: UpdateResult, table: &str, id: &str) -> Result<()> {
    if result.rows_affected == 0 {
        return Err(anyhow!("No {} row with id {}", table, id));
    }
    Ok(())
}

pub use credential_repository::CredentialRepository;
pub use download_repository::DownloadRepository;
pub use media_repository::MediaRepository;
