use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::broadcast;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::{DownloadEvent, TracingStatusReporter};
use super::progress::{ProgressCheckpoint, ProgressThrottle};
use super::traits::{ContentFetch, CredentialProvider, JobStore, MediaRecordStore, StatusReporter};
use crate::config::DownloadConfig;
use crate::connectivity::ConnectivityObserver;
use crate::models::{DownloadId, DownloadJob, DownloadOutcome, DownloadStatus, MediaItem};
use crate::storage::StorageAccountant;
use crate::utils::{DownloadError, format_bytes};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Tunables taken from `DownloadConfig` at construction
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub max_retries: u32,
    pub chunk_size: usize,
    pub progress_step: f64,
    pub progress_finish: f64,
    pub read_timeout: Duration,
}

impl From<&DownloadConfig> for ExecutorSettings {
    fn from(config: &DownloadConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            chunk_size: config.chunk_size_bytes.max(1),
            progress_step: config.progress_step(),
            progress_finish: config.progress_finish(),
            read_timeout: config.read_timeout(),
        }
    }
}

/// Credentials resolved by the precondition gate
struct Session {
    server_url: String,
    auth_token: String,
}

/// Runs a single attempt of a single download job
///
/// The executor never loops on failure. A retryable error puts the job back
/// to `Pending` through the job store and returns `DownloadOutcome::Retry`;
/// whoever scheduled the job decides when to run it again.
pub struct DownloadExecutor {
    jobs: Arc<dyn JobStore>,
    media: Arc<dyn MediaRecordStore>,
    credentials: Arc<dyn CredentialProvider>,
    fetcher: Arc<dyn ContentFetch>,
    storage: Arc<StorageAccountant>,
    reporter: Arc<dyn StatusReporter>,
    connectivity: Option<Arc<ConnectivityObserver>>,
    events: broadcast::Sender<DownloadEvent>,
    settings: ExecutorSettings,
}

impl DownloadExecutor {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        media: Arc<dyn MediaRecordStore>,
        credentials: Arc<dyn CredentialProvider>,
        fetcher: Arc<dyn ContentFetch>,
        storage: Arc<StorageAccountant>,
        config: &DownloadConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            jobs,
            media,
            credentials,
            fetcher,
            storage,
            reporter: Arc::new(TracingStatusReporter),
            connectivity: None,
            events,
            settings: ExecutorSettings::from(config),
        }
    }

    pub fn with_status_reporter(mut self, reporter: Arc<dyn StatusReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_connectivity(mut self, connectivity: Arc<ConnectivityObserver>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<DownloadEvent> {
        self.events.clone()
    }

    /// Run one attempt of `job_id` to a terminal or retry outcome
    pub async fn execute(&self, job_id: &DownloadId, cancel: &CancellationToken) -> DownloadOutcome {
        let job = match self.jobs.get_job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                let error = DownloadError::JobNotFound(job_id.to_string());
                error!("{}", error);
                return DownloadOutcome::Failure {
                    message: error.to_string(),
                };
            }
            Err(e) => {
                let error = DownloadError::store(e);
                error!("Failed to load download {}: {}", job_id, error);
                return DownloadOutcome::Failure {
                    message: error.to_string(),
                };
            }
        };

        if job.status != DownloadStatus::Pending {
            let error = DownloadError::NotPending {
                id: job.id.to_string(),
                status: job.status,
            };
            warn!("Refusing to run download: {}", error);
            return DownloadOutcome::Failure {
                message: error.to_string(),
            };
        }

        let media = match self.media.get_by_id(&job.media_item_id).await {
            Ok(Some(media)) => media,
            Ok(None) => {
                let error = DownloadError::MediaNotFound(job.media_item_id.to_string());
                return self.fail(&job, None, error, None).await;
            }
            Err(e) => {
                return self.fail(&job, None, DownloadError::store(e), None).await;
            }
        };

        let session = match self.resolve_session().await {
            Ok(session) => session,
            Err(error) => return self.fail(&job, Some(&media), error, None).await,
        };

        if !self.storage.has_enough_space(0) {
            let error = self.insufficient_storage(0);
            return self.fail(&job, Some(&media), error, None).await;
        }

        let destination = self.storage.file_path_for(&media.id);
        info!(
            "Starting download {} of '{}' (attempt {})",
            job.id,
            media.title,
            job.attempt_count + 1
        );

        match self
            .run_attempt(&job, media.clone(), &session, &destination, cancel)
            .await
        {
            Ok(()) => DownloadOutcome::Success {
                file_path: destination,
            },
            Err(DownloadError::Cancelled) => self.cancelled(&job, &destination).await,
            Err(error) if error.is_retryable() => {
                self.transfer_failed(&job, &media, error, &destination)
                    .await
            }
            Err(error) => self.fail(&job, Some(&media), error, Some(&destination)).await,
        }
    }

    /// Server URL and token must both be present and non-blank
    async fn resolve_session(&self) -> Result<Session, DownloadError> {
        let server_url = self
            .credentials
            .server_url()
            .await
            .map_err(DownloadError::store)?;
        let auth_token = self
            .credentials
            .auth_token()
            .await
            .map_err(DownloadError::store)?;

        match (server_url, auth_token) {
            (Some(server_url), Some(auth_token))
                if !server_url.trim().is_empty() && !auth_token.trim().is_empty() =>
            {
                Ok(Session {
                    server_url,
                    auth_token,
                })
            }
            _ => Err(DownloadError::NotAuthenticated),
        }
    }

    async fn run_attempt(
        &self,
        job: &DownloadJob,
        mut media: MediaItem,
        session: &Session,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), DownloadError> {
        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        self.jobs
            .update_status(&job.id, DownloadStatus::Downloading)
            .await
            .map_err(DownloadError::store)?;
        self.reporter.report_progress(&media.title, 0.0);
        self.emit(DownloadEvent::Started {
            job_id: job.id.clone(),
            title: media.title.clone(),
        });

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            response = self.fetcher.fetch(
                &session.server_url,
                &media.remote_content_id,
                &session.auth_token,
            ) => response.map_err(DownloadError::transfer)?,
        };

        if !(200..300).contains(&response.status) {
            return Err(DownloadError::Http {
                status: response.status,
            });
        }
        if response.content_length == Some(0) {
            return Err(DownloadError::EmptyBody {
                status: response.status,
            });
        }

        let total_bytes = response.content_length.unwrap_or(0);
        if total_bytes > 0 && !self.storage.has_enough_space(total_bytes) {
            return Err(self.insufficient_storage(total_bytes));
        }

        self.storage.download_root()?;
        let mut file = File::create(destination).await?;
        let mut reader = StreamReader::new(response.body);
        let mut buffer = vec![0u8; self.settings.chunk_size];
        let mut throttle = ProgressThrottle::new(
            job.id.clone(),
            self.settings.progress_step,
            self.settings.progress_finish,
        );
        let mut downloaded_bytes = 0u64;

        debug!(
            "Streaming {} into {:?} ({})",
            job.id,
            destination,
            if total_bytes > 0 {
                format_bytes(total_bytes)
            } else {
                "unknown size".to_string()
            }
        );

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
                read = tokio::time::timeout(self.settings.read_timeout, reader.read(&mut buffer)) => read,
            };
            let read = match read {
                Ok(Ok(read)) => read,
                Ok(Err(e)) => return Err(DownloadError::Transfer(e.to_string())),
                Err(_) => {
                    return Err(DownloadError::Transfer(format!(
                        "No data received for {} seconds",
                        self.settings.read_timeout.as_secs()
                    )));
                }
            };
            if read == 0 {
                break;
            }

            file.write_all(&buffer[..read]).await?;
            downloaded_bytes += read as u64;

            if let Some(checkpoint) = throttle.observe(downloaded_bytes, total_bytes) {
                self.checkpoint(&mut media, checkpoint).await?;
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if downloaded_bytes == 0 {
            return Err(DownloadError::EmptyBody { status: 200 });
        }
        if total_bytes > 0 && downloaded_bytes != total_bytes {
            return Err(DownloadError::IncompleteBody {
                received: downloaded_bytes,
                expected: total_bytes,
            });
        }

        if let Some(checkpoint) = throttle.finish(downloaded_bytes) {
            self.checkpoint(&mut media, checkpoint).await?;
        }

        let path = destination.to_string_lossy().into_owned();
        self.jobs
            .complete_download(&job.id, DownloadStatus::Completed, &path)
            .await
            .map_err(DownloadError::store)?;

        media.is_downloaded = true;
        media.download_progress = 1.0;
        media.local_file_path = Some(path.clone());
        self.media.update(&media).await.map_err(DownloadError::store)?;
        self.media
            .update_download_flag(&media.id, true, Some(&path))
            .await
            .map_err(DownloadError::store)?;

        info!(
            "Download {} complete: {} written to {}",
            job.id,
            format_bytes(downloaded_bytes),
            path
        );
        self.reporter.report_completed(&media.title);
        self.emit(DownloadEvent::Completed {
            job_id: job.id.clone(),
            file_path: destination.to_path_buf(),
        });
        Ok(())
    }

    /// Persist a checkpoint and mirror it onto the media record
    async fn checkpoint(
        &self,
        media: &mut MediaItem,
        checkpoint: ProgressCheckpoint,
    ) -> Result<(), DownloadError> {
        debug!(
            "Checkpoint {}: {:.1}% ({}/{} bytes)",
            checkpoint.job_id,
            checkpoint.progress * 100.0,
            checkpoint.downloaded_bytes,
            checkpoint.total_bytes
        );

        self.jobs
            .update_progress(
                &checkpoint.job_id,
                checkpoint.progress,
                checkpoint.downloaded_bytes,
                checkpoint.total_bytes,
            )
            .await
            .map_err(DownloadError::store)?;

        media.download_progress = checkpoint.progress;
        self.media.update(media).await.map_err(DownloadError::store)?;

        self.reporter.report_progress(&media.title, checkpoint.progress);
        self.emit(DownloadEvent::Progress(checkpoint));
        Ok(())
    }

    /// Retryable failure: requeue while attempts remain
    async fn transfer_failed(
        &self,
        job: &DownloadJob,
        media: &MediaItem,
        error: DownloadError,
        destination: &Path,
    ) -> DownloadOutcome {
        let message = error.to_string();
        if self.is_offline() {
            warn!("Download {} interrupted by connectivity loss: {}", job.id, message);
        } else {
            warn!("Download {} attempt failed: {}", job.id, message);
        }

        if let Err(e) = self.jobs.mark_failed(&job.id, &message).await {
            error!("Failed to record failure of {}: {:#}", job.id, e);
        }

        if job.attempt_count < self.settings.max_retries {
            match self.jobs.requeue(&job.id).await {
                Ok(()) => {
                    info!(
                        "Download {} requeued ({} of {} retries used)",
                        job.id,
                        job.attempt_count + 1,
                        self.settings.max_retries
                    );
                    self.emit(DownloadEvent::Failed {
                        job_id: job.id.clone(),
                        message: message.clone(),
                        will_retry: true,
                    });
                    return DownloadOutcome::Retry { message };
                }
                Err(e) => error!("Failed to requeue {}: {:#}", job.id, e),
            }
        } else {
            error!(
                "Download {} gave up after {} attempts",
                job.id,
                job.attempt_count + 1
            );
        }

        self.reporter.report_failed(&media.title, &message);
        self.emit(DownloadEvent::Failed {
            job_id: job.id.clone(),
            message: message.clone(),
            will_retry: false,
        });
        self.storage.delete_file(destination);
        DownloadOutcome::Failure { message }
    }

    /// Terminal failure without consuming a retry
    async fn fail(
        &self,
        job: &DownloadJob,
        media: Option<&MediaItem>,
        error: DownloadError,
        partial: Option<&Path>,
    ) -> DownloadOutcome {
        let message = error.to_string();
        error!("Download {} failed: {}", job.id, message);

        if let Err(e) = self.jobs.mark_failed(&job.id, &message).await {
            error!("Failed to record failure of {}: {:#}", job.id, e);
        }
        if let Some(path) = partial {
            self.storage.delete_file(path);
        }
        if let Some(media) = media {
            self.reporter.report_failed(&media.title, &message);
        }
        self.emit(DownloadEvent::Failed {
            job_id: job.id.clone(),
            message: message.clone(),
            will_retry: false,
        });
        DownloadOutcome::Failure { message }
    }

    async fn cancelled(&self, job: &DownloadJob, destination: &Path) -> DownloadOutcome {
        info!("Download {} cancelled", job.id);
        if self.storage.delete_file(destination) {
            debug!("Removed partial file {:?}", destination);
        }
        if let Err(e) = self
            .jobs
            .update_status(&job.id, DownloadStatus::Cancelled)
            .await
        {
            error!("Failed to record cancellation of {}: {:#}", job.id, e);
        }
        self.emit(DownloadEvent::Cancelled {
            job_id: job.id.clone(),
        });
        DownloadOutcome::Cancelled
    }

    /// Mark a job that is not currently running as cancelled
    ///
    /// Used for jobs parked between attempts: there is no transfer to stop,
    /// only the store record and any leftover partial file.
    pub async fn cancel_idle(&self, job_id: &DownloadId) -> DownloadOutcome {
        match self.jobs.get_job(job_id).await {
            Ok(Some(job)) => {
                let destination = self.storage.file_path_for(&job.media_item_id);
                self.cancelled(&job, &destination).await
            }
            Ok(None) => {
                warn!("Cannot cancel download {}: not in store", job_id);
                DownloadOutcome::Cancelled
            }
            Err(e) => {
                error!("Failed to load download {} for cancellation: {:#}", job_id, e);
                DownloadOutcome::Cancelled
            }
        }
    }

    fn insufficient_storage(&self, required: u64) -> DownloadError {
        DownloadError::InsufficientStorage {
            required,
            available: self.storage.available_bytes(),
        }
    }

    fn is_offline(&self) -> bool {
        self.connectivity
            .as_ref()
            .is_some_and(|connectivity| !connectivity.is_online())
    }

    fn emit(&self, event: DownloadEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
