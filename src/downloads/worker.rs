use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::DownloadEvent;
use super::executor::DownloadExecutor;
use crate::config::DownloadConfig;
use crate::models::{DownloadId, DownloadOutcome};

/// Commands accepted by the download worker
#[derive(Debug)]
pub enum WorkerCommand {
    Enqueue {
        job_id: DownloadId,
        respond_to: oneshot::Sender<bool>,
    },
    Cancel {
        job_id: DownloadId,
        respond_to: oneshot::Sender<bool>,
    },
    ActiveJobs {
        respond_to: oneshot::Sender<Vec<DownloadId>>,
    },
    /// Cancel everything in flight and stop once it has settled
    Shutdown,
}

/// Messages from spawned job tasks back to the loop
#[derive(Debug)]
enum JobEvent {
    Finished {
        job_id: DownloadId,
        outcome: DownloadOutcome,
    },
    RetryDue {
        job_id: DownloadId,
    },
}

/// In-process scheduler for download jobs
///
/// Runs at most one executor per job id, caps parallel transfers with a
/// semaphore and enqueues `Retry` outcomes again after a fixed delay.
pub struct DownloadWorker {
    executor: Arc<DownloadExecutor>,
    semaphore: Arc<Semaphore>,
    retry_delay: Duration,
    commands: mpsc::UnboundedReceiver<WorkerCommand>,
    job_events_tx: mpsc::UnboundedSender<JobEvent>,
    job_events: mpsc::UnboundedReceiver<JobEvent>,
    active: HashMap<DownloadId, CancellationToken>,
    /// Jobs sleeping before their next attempt, keyed to their timer
    waiting_retry: HashMap<DownloadId, CancellationToken>,
    root_token: CancellationToken,
    pending: watch::Sender<usize>,
    shutting_down: bool,
}

impl DownloadWorker {
    /// Spawn the worker loop on the current runtime
    pub fn spawn(
        executor: Arc<DownloadExecutor>,
        config: &DownloadConfig,
    ) -> (DownloadWorkerHandle, JoinHandle<()>) {
        let (sender, commands) = mpsc::unbounded_channel();
        let (job_events_tx, job_events) = mpsc::unbounded_channel();
        let (pending, pending_rx) = watch::channel(0usize);
        let events = executor.event_sender();

        let worker = Self {
            executor,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_downloads.max(1) as usize)),
            retry_delay: config.retry_delay(),
            commands,
            job_events_tx,
            job_events,
            active: HashMap::new(),
            waiting_retry: HashMap::new(),
            root_token: CancellationToken::new(),
            pending,
            shutting_down: false,
        };

        let handle = DownloadWorkerHandle {
            sender,
            pending: pending_rx,
            events,
        };
        (handle, tokio::spawn(worker.run()))
    }

    async fn run(mut self) {
        info!(
            "Download worker started ({} concurrent, retry after {:?})",
            self.semaphore.available_permits(),
            self.retry_delay
        );

        loop {
            tokio::select! {
                command = self.commands.recv(), if !self.shutting_down => match command {
                    Some(command) => self.handle_command(command),
                    None => self.begin_shutdown(),
                },
                Some(event) = self.job_events.recv() => self.handle_job_event(event),
            }

            if self.shutting_down && self.active.is_empty() {
                break;
            }
        }

        info!("Download worker stopped");
    }

    fn handle_command(&mut self, command: WorkerCommand) {
        match command {
            WorkerCommand::Enqueue { job_id, respond_to } => {
                let accepted = !self.is_known(&job_id) && self.start(job_id);
                let _ = respond_to.send(accepted);
            }
            WorkerCommand::Cancel { job_id, respond_to } => {
                let cancelled = self.cancel(&job_id);
                let _ = respond_to.send(cancelled);
            }
            WorkerCommand::ActiveJobs { respond_to } => {
                let mut jobs: Vec<DownloadId> = self.active.keys().cloned().collect();
                jobs.sort();
                let _ = respond_to.send(jobs);
            }
            WorkerCommand::Shutdown => self.begin_shutdown(),
        }
    }

    fn handle_job_event(&mut self, event: JobEvent) {
        match event {
            JobEvent::Finished { job_id, outcome } => {
                self.active.remove(&job_id);
                debug!("Download {} settled: {:?}", job_id, outcome);

                if outcome.should_retry() && !self.shutting_down {
                    self.schedule_retry(job_id);
                }
            }
            JobEvent::RetryDue { job_id } => {
                if self.waiting_retry.remove(&job_id).is_some() && !self.shutting_down {
                    self.start(job_id);
                }
            }
        }
        self.publish_pending();
    }

    fn is_known(&self, job_id: &DownloadId) -> bool {
        self.active.contains_key(job_id) || self.waiting_retry.contains_key(job_id)
    }

    fn start(&mut self, job_id: DownloadId) -> bool {
        if self.shutting_down {
            return false;
        }

        let token = self.root_token.child_token();
        self.active.insert(job_id.clone(), token.clone());
        self.publish_pending();

        let executor = self.executor.clone();
        let semaphore = self.semaphore.clone();
        let job_events = self.job_events_tx.clone();

        tokio::spawn(async move {
            // A job cancelled while queued still runs so its status is recorded
            let _permit = tokio::select! {
                permit = semaphore.acquire_owned() => permit.ok(),
                _ = token.cancelled() => None,
            };

            let outcome = executor.execute(&job_id, &token).await;
            let _ = job_events.send(JobEvent::Finished { job_id, outcome });
        });
        true
    }

    fn cancel(&mut self, job_id: &DownloadId) -> bool {
        if let Some(token) = self.active.get(job_id) {
            info!("Cancelling download {}", job_id);
            token.cancel();
            return true;
        }
        if let Some(timer) = self.waiting_retry.remove(job_id) {
            info!("Cancelling download {} while it waits to retry", job_id);
            timer.cancel();
            self.record_cancellation(job_id.clone());
            return true;
        }
        false
    }

    /// Settle a job that has no executor running as cancelled in the store
    fn record_cancellation(&mut self, job_id: DownloadId) {
        let token = self.root_token.child_token();
        token.cancel();
        self.active.insert(job_id.clone(), token);
        self.publish_pending();

        let executor = self.executor.clone();
        let job_events = self.job_events_tx.clone();
        tokio::spawn(async move {
            let outcome = executor.cancel_idle(&job_id).await;
            let _ = job_events.send(JobEvent::Finished { job_id, outcome });
        });
    }

    fn schedule_retry(&mut self, job_id: DownloadId) {
        info!("Retrying download {} in {:?}", job_id, self.retry_delay);
        let token = self.root_token.child_token();
        self.waiting_retry.insert(job_id.clone(), token.clone());

        let delay = self.retry_delay;
        let job_events = self.job_events_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    let _ = job_events.send(JobEvent::RetryDue { job_id });
                }
                _ = token.cancelled() => {}
            }
        });
    }

    fn begin_shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        info!(
            "Download worker shutting down, cancelling {} active downloads",
            self.active.len()
        );
        self.shutting_down = true;
        self.waiting_retry.clear();
        self.root_token.cancel();
        self.publish_pending();
    }

    fn publish_pending(&self) {
        let pending = self.active.len() + self.waiting_retry.len();
        self.pending.send_if_modified(|current| {
            if *current == pending {
                false
            } else {
                *current = pending;
                true
            }
        });
    }
}

/// Cloneable handle to a running `DownloadWorker`
#[derive(Clone)]
pub struct DownloadWorkerHandle {
    sender: mpsc::UnboundedSender<WorkerCommand>,
    pending: watch::Receiver<usize>,
    events: broadcast::Sender<DownloadEvent>,
}

impl DownloadWorkerHandle {
    /// Schedule a job; `false` when it is already running or waiting to retry
    pub async fn enqueue(&self, job_id: DownloadId) -> Result<bool> {
        let (respond_to, response) = oneshot::channel();
        self.send(WorkerCommand::Enqueue { job_id, respond_to })?;
        response.await.map_err(|_| anyhow!("Download worker dropped the request"))
    }

    pub async fn cancel(&self, job_id: DownloadId) -> Result<bool> {
        let (respond_to, response) = oneshot::channel();
        self.send(WorkerCommand::Cancel { job_id, respond_to })?;
        response.await.map_err(|_| anyhow!("Download worker dropped the request"))
    }

    pub async fn active_jobs(&self) -> Result<Vec<DownloadId>> {
        let (respond_to, response) = oneshot::channel();
        self.send(WorkerCommand::ActiveJobs { respond_to })?;
        response.await.map_err(|_| anyhow!("Download worker dropped the request"))
    }

    /// Number of jobs running or waiting for a retry
    pub fn pending_count(&self) -> usize {
        *self.pending.borrow()
    }

    /// Wait until no job is running or waiting for a retry
    pub async fn wait_until_idle(&self) -> Result<()> {
        let mut pending = self.pending.clone();
        pending
            .wait_for(|count| *count == 0)
            .await
            .map_err(|_| anyhow!("Download worker stopped"))?;
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.events.subscribe()
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(WorkerCommand::Shutdown)
    }

    fn send(&self, command: WorkerCommand) -> Result<()> {
        self.sender.send(command).map_err(|_| {
            warn!("Download worker is not running");
            anyhow!("Download worker is not running")
        })
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
