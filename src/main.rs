use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use reel_offline::config::DownloadConfig;
use reel_offline::connectivity::{ConnectivityObserver, ManualNetworkPlatform, NetworkCapabilities};
use reel_offline::db::{CredentialRepository, Database, DownloadRepository, MediaRepository};
use reel_offline::downloads::{DownloadExecutor, DownloadWorker, HttpContentFetch};
use reel_offline::models::DownloadStatus;
use reel_offline::storage::StorageAccountant;
use reel_offline::utils::format_bytes;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("reel_offline=info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => DownloadConfig::load_from(&PathBuf::from(path))?,
        None => DownloadConfig::load()?,
    };

    let db = Database::connect(&config.database_path()?)
        .await
        .context("Failed to open download database")?;
    db.migrate().await?;
    let connection = db.shared();

    let jobs = Arc::new(DownloadRepository::new(connection.clone()));
    let media = Arc::new(MediaRepository::new(connection.clone()));
    let credentials = Arc::new(CredentialRepository::new(connection));

    let platform = Arc::new(ManualNetworkPlatform::new(Some(NetworkCapabilities::internet())));
    let connectivity = Arc::new(ConnectivityObserver::new(platform));
    connectivity.start_monitoring();

    let storage = Arc::new(StorageAccountant::from_config(&config)?);
    let snapshot = storage.snapshot();
    info!(
        "Download storage: {} free of {}, {} used by downloads",
        format_bytes(snapshot.available_bytes),
        format_bytes(snapshot.total_bytes),
        format_bytes(snapshot.used_by_downloads)
    );
    if storage.is_storage_low() {
        warn!("Device storage is running low");
    }

    let executor = DownloadExecutor::new(
        jobs.clone(),
        media,
        credentials,
        Arc::new(HttpContentFetch::new(&config)?),
        storage,
        &config,
    )
    .with_connectivity(connectivity.clone());

    let (worker, worker_task) = DownloadWorker::spawn(Arc::new(executor), &config);

    let interrupted = jobs.reset_interrupted().await?;
    if interrupted > 0 {
        info!("Resuming {} interrupted downloads", interrupted);
    }

    let pending = jobs.find_by_status(DownloadStatus::Pending).await?;
    info!("Found {} pending downloads", pending.len());
    for job in pending {
        worker.enqueue(job.id).await?;
    }

    tokio::select! {
        result = worker.wait_until_idle() => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted, cancelling downloads"),
    }

    worker.shutdown()?;
    worker_task.await?;
    connectivity.stop_monitoring();

    Ok(())
}
