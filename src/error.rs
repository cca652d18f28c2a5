use thiserror::Error;

use crate::job::{ErrorDetail, JobId, JobStatus};

pub type Result<T> = std::result::Result<T, FinchError>;

#[derive(Debug, Error)]
pub enum FinchError {
    #[error("Unknown process: {0}")]
    UnknownProcess(String),

    #[error("Process already registered: {0}")]
    DuplicateProcess(String),

    #[error("Invalid process descriptor '{process}': {reason}")]
    InvalidDescriptor { process: String, reason: String },

    #[error("Invalid input '{parameter}': {reason}")]
    InvalidInput { parameter: String, reason: String },

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Result of job {job_id} not ready (status {status})")]
    ResultNotReady { job_id: JobId, status: JobStatus },

    #[error("Job {job_id} failed: {detail}")]
    JobFailed { job_id: JobId, detail: ErrorDetail },

    #[error("Job {0} was cancelled")]
    JobCancelled(JobId),

    #[error("Execution engine is shut down")]
    EngineStopped,

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl FinchError {
    pub(crate) fn invalid_input(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        FinchError::InvalidInput {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Infrastructure failures are the only errors worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FinchError::StoreUnavailable(_))
    }
}
