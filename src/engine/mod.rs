//! Asynchronous execution of submitted jobs.
//!
//! [`ExecutionEngine::submit`] validates a request, records an `ACCEPTED` job
//! and queues it, returning immediately. A fixed pool of worker tasks pulls
//! jobs off the queue, runs their handlers and writes every status change
//! through the [`JobStore`].

mod retry;
mod worker;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use retry::RetryConfig;

use crate::artifact::ArtifactStore;
use crate::error::{FinchError, Result};
use crate::facade::StatusFacade;
use crate::job::{JobId, JobStatus, JobStore};
use crate::process::{Inputs, ProcessRegistry, bind_inputs};

/// Engine tuning, independent of how requests arrive.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of jobs executed concurrently.
    pub workers: usize,
    /// Parent of the per-job working directories.
    pub workdir: PathBuf,
    pub retry: RetryConfig,
    /// Applied to processes that declare no maximum duration.
    pub default_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            workdir: std::env::temp_dir().join("finch"),
            retry: RetryConfig::default(),
            default_timeout: None,
        }
    }
}

/// State shared between the engine front and its workers.
pub(crate) struct Shared {
    registry: Arc<ProcessRegistry>,
    store: Arc<dyn JobStore>,
    artifacts: Arc<dyn ArtifactStore>,
    retry: RetryConfig,
    workdir: PathBuf,
    default_timeout: Option<Duration>,
    tokens: Mutex<HashMap<JobId, CancellationToken>>,
}

impl Shared {
    fn token_for(&self, job_id: JobId) -> CancellationToken {
        self.tokens.lock().entry(job_id).or_default().clone()
    }

    /// Cancels the token of a job still tracked by the engine.
    ///
    /// Never creates a token, so a job that already finished leaves no entry behind.
    fn raise(&self, job_id: &JobId) {
        if let Some(token) = self.tokens.lock().get(job_id) {
            token.cancel();
        }
    }

    fn forget(&self, job_id: JobId) {
        self.tokens.lock().remove(&job_id);
    }
}

pub struct ExecutionEngine {
    shared: Arc<Shared>,
    sender: Mutex<Option<mpsc::UnboundedSender<JobId>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ExecutionEngine {
    /// Spawns the worker pool and resumes jobs left `ACCEPTED` in the store.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        registry: Arc<ProcessRegistry>,
        store: Arc<dyn JobStore>,
        artifacts: Arc<dyn ArtifactStore>,
        config: EngineConfig,
    ) -> Self {
        let shared = Arc::new(Shared {
            registry,
            store,
            artifacts,
            retry: config.retry,
            workdir: config.workdir,
            default_timeout: config.default_timeout,
            tokens: Mutex::new(HashMap::new()),
        });

        let (sender, receiver) = mpsc::unbounded_channel();
        let queue: worker::Queue = Arc::new(AsyncMutex::new(receiver));
        let count = config.workers.max(1);
        let workers = (0..count)
            .map(|i| tokio::spawn(worker::run_worker(Arc::clone(&shared), Arc::clone(&queue), i)))
            .collect();

        let resumed: Vec<JobId> = shared
            .store
            .list()
            .into_iter()
            .filter(|job| job.status == JobStatus::Accepted)
            .map(|job| job.id)
            .collect();
        for id in &resumed {
            let _ = sender.send(*id);
        }
        tracing::info!(workers = count, resumed = resumed.len(), "Execution engine started");

        Self {
            shared,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        }
    }

    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.shared.registry
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.shared.store
    }

    /// Read-only view over the jobs this engine runs.
    pub fn facade(&self) -> StatusFacade {
        StatusFacade::new(Arc::clone(&self.shared.store))
    }

    /// Validates and queues a request, returning the new job id without waiting.
    ///
    /// Nothing is recorded when validation fails.
    pub async fn submit(&self, process_id: &str, inputs: Inputs) -> Result<JobId> {
        let sender = self.sender.lock().clone().ok_or(FinchError::EngineStopped)?;

        let descriptor = self.shared.registry.lookup(process_id)?;
        let bound = bind_inputs(&descriptor, &inputs)?;

        let job_id = self
            .shared
            .retry
            .run("create", || self.shared.store.create(process_id, bound.clone()))
            .await?;
        self.shared.token_for(job_id);

        if sender.send(job_id).is_err() {
            // Workers are gone; the job cannot run, so withdraw it.
            self.shared.forget(job_id);
            let _ = self.shared.store.transition(&job_id, JobStatus::Cancelled, None);
            return Err(FinchError::EngineStopped);
        }
        tracing::info!(job_id = %job_id, process = process_id, "Job accepted");
        Ok(job_id)
    }

    /// Requests cancellation of a job and returns its status afterwards.
    ///
    /// An `ACCEPTED` job is cancelled at once. A `RUNNING` job has its
    /// cancellation flag raised and stays `RUNNING` until its handler returns.
    /// Terminal jobs cannot be cancelled.
    pub async fn cancel(&self, job_id: &JobId) -> Result<JobStatus> {
        let job = self.shared.store.get(job_id)?;
        match job.status {
            JobStatus::Accepted => {
                self.shared.raise(job_id);
                let result = self
                    .shared
                    .retry
                    .run("transition", || {
                        self.shared.store.transition_from(
                            job_id,
                            JobStatus::Accepted,
                            JobStatus::Cancelled,
                            None,
                        )
                    })
                    .await;
                match result {
                    Ok(job) => {
                        tracing::info!(job_id = %job_id, "Job cancelled before start");
                        Ok(job.status)
                    }
                    // A worker picked it up in the meantime.
                    Err(FinchError::InvalidTransition {
                        from: JobStatus::Running,
                        ..
                    }) => self.stop_running(job_id),
                    Err(e) => Err(e),
                }
            }
            JobStatus::Running => self.stop_running(job_id),
            terminal => Err(FinchError::InvalidTransition {
                job_id: *job_id,
                from: terminal,
                to: JobStatus::Cancelled,
            }),
        }
    }

    /// Raises the flag of a running job, then reports where it stands.
    fn stop_running(&self, job_id: &JobId) -> Result<JobStatus> {
        self.shared.raise(job_id);
        let status = self.shared.store.get(job_id)?.status;
        if status.is_terminal() {
            return Err(FinchError::InvalidTransition {
                job_id: *job_id,
                from: status,
                to: JobStatus::Cancelled,
            });
        }
        tracing::info!(job_id = %job_id, "Cancellation requested");
        Ok(status)
    }

    /// Stops accepting jobs and waits for workers to finish queued and running jobs.
    pub async fn shutdown(&self) {
        self.sender.lock().take();
        let workers: Vec<_> = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Worker ended abnormally");
            }
        }
        tracing::info!("Execution engine stopped");
    }
}
