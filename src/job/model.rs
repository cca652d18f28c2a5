use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::process::{Inputs, Value};

/// Identifier of a job, generated at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Accepted,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Accepted => write!(f, "ACCEPTED"),
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Succeeded => write!(f, "SUCCEEDED"),
            JobStatus::Failed => write!(f, "FAILED"),
            JobStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Classifies why a job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The handler returned an error.
    Handler,
    /// The handler exceeded the process's maximum duration.
    Timeout,
    /// The handler panicked.
    Panic,
    /// The handler produced outputs its descriptor does not declare.
    Contract,
    /// A file output could not be staged.
    Staging,
    /// The service stopped while the job was in flight.
    Interrupted,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Handler => write!(f, "handler"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Panic => write!(f, "panic"),
            FailureKind::Contract => write!(f, "contract"),
            FailureKind::Staging => write!(f, "staging"),
            FailureKind::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Error captured on a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: FailureKind,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Data of a recorded output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputData {
    Literal { value: Value },
    /// Location of a staged artifact.
    Reference { location: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    pub name: String,
    #[serde(flatten)]
    pub data: OutputData,
}

impl Output {
    pub fn literal(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            data: OutputData::Literal {
                value: value.into(),
            },
        }
    }

    pub fn reference(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: OutputData::Reference {
                location: location.into(),
            },
        }
    }
}

/// One invocation of a process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub process_id: String,
    pub inputs: Inputs,
    pub status: JobStatus,
    pub status_history: Vec<JobStatus>,
    pub progress: u8,
    pub message: Option<String>,
    pub outputs: Vec<Output>,
    pub error: Option<ErrorDetail>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(process_id: impl Into<String>, inputs: Inputs) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            process_id: process_id.into(),
            inputs,
            status: JobStatus::Accepted,
            status_history: vec![JobStatus::Accepted],
            progress: 0,
            message: None,
            outputs: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    /// Wall-clock time spent running, if the job has started.
    pub fn duration_ms(&self) -> Option<i64> {
        let started = self.started_at?;
        let end = self.finished_at.unwrap_or_else(Utc::now);
        Some((end - started).num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_creation_defaults() {
        let job = Job::new("subset_bbox", Inputs::new());
        assert_eq!(job.status, JobStatus::Accepted);
        assert_eq!(job.status_history, vec![JobStatus::Accepted]);
        assert_eq!(job.progress, 0);
        assert!(job.outputs.is_empty());
        assert!(job.error.is_none());
        assert!(job.duration_ms().is_none());
        assert_eq!(job.created_at, job.updated_at);
    }

    #[test]
    fn job_ids_are_unique_and_parse() {
        let a = JobId::new();
        let b = JobId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().parse::<JobId>().unwrap(), a);
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }

    #[test]
    fn status_display() {
        assert_eq!(JobStatus::Accepted.to_string(), "ACCEPTED");
        assert_eq!(JobStatus::Running.to_string(), "RUNNING");
        assert_eq!(JobStatus::Succeeded.to_string(), "SUCCEEDED");
        assert_eq!(JobStatus::Failed.to_string(), "FAILED");
        assert_eq!(JobStatus::Cancelled.to_string(), "CANCELLED");
    }

    #[test]
    fn status_serializes_like_display() {
        let json = serde_json::to_string(&JobStatus::Succeeded).unwrap();
        assert_eq!(json, "\"SUCCEEDED\"");
    }

    #[test]
    fn output_serialization_is_flat() {
        let json = serde_json::to_value(Output::reference("output", "file:///out/a.nc")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "output", "kind": "reference", "location": "file:///out/a.nc"})
        );
    }

    #[test]
    fn job_serialization_roundtrip() {
        let job = Job::new("add", Inputs::new().with("a", 2i64));
        let json = serde_json::to_string(&job).unwrap();
        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, job.id);
        assert_eq!(back.inputs, job.inputs);
        assert_eq!(back.status, JobStatus::Accepted);
    }
}
