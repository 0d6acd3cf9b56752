use anyhow::{Context, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::migrations::Migrator;

/// Settings applied to every new SQLite connection
const SQLITE_PRAGMAS: &[&str] = &["PRAGMA foreign_keys = ON", "PRAGMA journal_mode = WAL"];

/// SQLite file holding download jobs, media records and credentials
pub struct Database {
    connection: Arc<DatabaseConnection>,
}

impl Database {
    /// Open (or create) the database file at `path`
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create database directory {:?}", dir))?;
        }

        let mut options = ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()));
        options.max_connections(4).sqlx_logging(false);

        let connection = sea_orm::Database::connect(options)
            .await
            .with_context(|| format!("Cannot open download database {:?}", path))?;
        for pragma in SQLITE_PRAGMAS {
            connection
                .execute_unprepared(pragma)
                .await
                .with_context(|| format!("`{}` failed", pragma))?;
        }

        info!("Opened download database {:?}", path);
        Ok(Self {
            connection: Arc::new(connection),
        })
    }

    /// Connection handle shared by the repositories
    pub fn shared(&self) -> Arc<DatabaseConnection> {
        Arc::clone(&self.connection)
    }

    /// Bring the schema up to date; a no-op when nothing is pending
    pub async fn migrate(&self) -> Result<()> {
        let pending = Migrator::get_pending_migrations(self.connection.as_ref())
            .await
            .context("Cannot list pending migrations")?
            .len();
        if pending == 0 {
            debug!("Download database schema is current");
            return Ok(());
        }

        Migrator::up(self.connection.as_ref(), None)
            .await
            .context("Database migration failed")?;
        info!("Applied {} database migrations", pending);
        Ok(())
    }
}
