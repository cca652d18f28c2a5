//! Read-only queries over the job store, shaped for a request-dispatch layer.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{FinchError, Result};
use crate::job::{ErrorDetail, FailureKind, Job, JobId, JobStatus, JobStore, Output};

/// Externally visible projection of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub job_id: JobId,
    pub process_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&Job> for StatusReport {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            process_id: job.process_id.clone(),
            status: job.status,
            progress: job.progress,
            message: job.message.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
        }
    }
}

#[derive(Clone)]
pub struct StatusFacade {
    store: Arc<dyn JobStore>,
}

impl StatusFacade {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub fn status(&self, job_id: &JobId) -> Result<StatusReport> {
        Ok(StatusReport::from(&self.store.get(job_id)?))
    }

    /// Outputs of a succeeded job.
    pub fn result(&self, job_id: &JobId) -> Result<Vec<Output>> {
        let job = self.store.get(job_id)?;
        match job.status {
            JobStatus::Succeeded => Ok(job.outputs),
            JobStatus::Accepted | JobStatus::Running => Err(FinchError::ResultNotReady {
                job_id: job.id,
                status: job.status,
            }),
            JobStatus::Failed => Err(FinchError::JobFailed {
                job_id: job.id,
                detail: job.error.unwrap_or_else(|| {
                    ErrorDetail::new(FailureKind::Handler, "no error detail recorded")
                }),
            }),
            JobStatus::Cancelled => Err(FinchError::JobCancelled(job.id)),
        }
    }

    /// Polls until the job reaches a terminal status.
    pub async fn wait(&self, job_id: &JobId, interval: Duration) -> Result<StatusReport> {
        loop {
            let report = self.status(job_id)?;
            if report.status.is_terminal() {
                return Ok(report);
            }
            tokio::time::sleep(interval).await;
        }
    }
}
