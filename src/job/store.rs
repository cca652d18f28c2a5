use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::files::JobFiles;
use super::model::{ErrorDetail, FailureKind, Job, JobId, JobStatus, Output};
use super::state::{apply_progress, apply_transition};
use crate::error::{FinchError, Result};
use crate::process::{Inputs, ProcessRegistry};

/// Authoritative record of jobs.
///
/// Every mutation goes through one of these operations. Calls on the same job
/// are serialized; calls on different jobs do not contend.
pub trait JobStore: Send + Sync {
    /// Allocates an `ACCEPTED` job for a registered process.
    fn create(&self, process_id: &str, inputs: Inputs) -> Result<JobId>;

    /// Current snapshot of a job.
    fn get(&self, id: &JobId) -> Result<Job>;

    /// Moves a job to `next`, returning the updated snapshot.
    fn transition(&self, id: &JobId, next: JobStatus, detail: Option<ErrorDetail>) -> Result<Job>;

    /// Like [`JobStore::transition`], but only when the job is currently `expected`.
    fn transition_from(
        &self,
        id: &JobId,
        expected: JobStatus,
        next: JobStatus,
        detail: Option<ErrorDetail>,
    ) -> Result<Job>;

    /// Records an output. Only a `RUNNING` job accepts outputs.
    fn append_output(&self, id: &JobId, output: Output) -> Result<()>;

    /// Raises the progress of a `RUNNING` job; ignored in any other state.
    fn update_progress(&self, id: &JobId, percent: u8, message: Option<String>) -> Result<()>;

    fn count(&self) -> usize;

    /// All jobs, oldest first.
    fn list(&self) -> Vec<Job>;
}

/// Job store held in process memory, optionally written through to disk.
pub struct LocalJobStore {
    registry: Arc<ProcessRegistry>,
    jobs: RwLock<HashMap<JobId, Arc<Mutex<Job>>>>,
    files: Option<JobFiles>,
}

impl LocalJobStore {
    /// A store whose jobs are lost when the process exits.
    pub fn in_memory(registry: Arc<ProcessRegistry>) -> Self {
        Self {
            registry,
            jobs: RwLock::new(HashMap::new()),
            files: None,
        }
    }

    /// A store persisted as one JSON document per job under `dir`.
    ///
    /// Jobs a previous process left `RUNNING` are marked `FAILED` as
    /// interrupted; `ACCEPTED` jobs are kept for the engine to resume. Jobs of
    /// processes that are no longer registered are skipped.
    pub fn open(registry: Arc<ProcessRegistry>, dir: impl Into<PathBuf>) -> Result<Self> {
        let files = JobFiles::open(dir)?;
        let mut jobs = HashMap::new();
        for mut job in files.load_all()? {
            if !registry.contains(&job.process_id) {
                tracing::warn!(job_id = %job.id, process = %job.process_id, "Skipping job of unregistered process");
                continue;
            }
            if job.status == JobStatus::Running {
                apply_transition(
                    &mut job,
                    JobStatus::Failed,
                    Some(ErrorDetail::new(
                        FailureKind::Interrupted,
                        "service stopped while the job was running",
                    )),
                )?;
                files.write(&job)?;
                tracing::warn!(job_id = %job.id, process = %job.process_id, "Marked interrupted job as failed");
            }
            jobs.insert(job.id, Arc::new(Mutex::new(job)));
        }
        tracing::info!(dir = %files.dir().display(), jobs = jobs.len(), "Opened job store");

        Ok(Self {
            registry,
            jobs: RwLock::new(jobs),
            files: Some(files),
        })
    }

    fn slot(&self, id: &JobId) -> Result<Arc<Mutex<Job>>> {
        self.jobs
            .read()
            .get(id)
            .cloned()
            .ok_or(FinchError::JobNotFound(*id))
    }

    /// Applies `f` to a copy of the job and commits it only once it is persisted.
    fn update<F>(&self, id: &JobId, f: F) -> Result<Job>
    where
        F: FnOnce(&mut Job) -> Result<()>,
    {
        let slot = self.slot(id)?;
        let mut current = slot.lock();
        let mut next = current.clone();
        f(&mut next)?;
        if let Some(files) = &self.files {
            files.write(&next)?;
        }
        *current = next.clone();
        Ok(next)
    }
}

impl JobStore for LocalJobStore {
    fn create(&self, process_id: &str, inputs: Inputs) -> Result<JobId> {
        if !self.registry.contains(process_id) {
            return Err(FinchError::UnknownProcess(process_id.to_string()));
        }
        let job = Job::new(process_id, inputs);
        if let Some(files) = &self.files {
            files.write(&job)?;
        }
        let id = job.id;
        self.jobs.write().insert(id, Arc::new(Mutex::new(job)));
        Ok(id)
    }

    fn get(&self, id: &JobId) -> Result<Job> {
        Ok(self.slot(id)?.lock().clone())
    }

    fn transition(&self, id: &JobId, next: JobStatus, detail: Option<ErrorDetail>) -> Result<Job> {
        self.update(id, |job| apply_transition(job, next, detail))
    }

    fn transition_from(
        &self,
        id: &JobId,
        expected: JobStatus,
        next: JobStatus,
        detail: Option<ErrorDetail>,
    ) -> Result<Job> {
        self.update(id, |job| {
            if job.status != expected {
                return Err(FinchError::InvalidTransition {
                    job_id: job.id,
                    from: job.status,
                    to: next,
                });
            }
            apply_transition(job, next, detail)
        })
    }

    fn append_output(&self, id: &JobId, output: Output) -> Result<()> {
        self.update(id, |job| {
            if job.status != JobStatus::Running {
                return Err(FinchError::InvalidTransition {
                    job_id: job.id,
                    from: job.status,
                    to: JobStatus::Succeeded,
                });
            }
            job.outputs.push(output);
            Ok(())
        })?;
        Ok(())
    }

    fn update_progress(&self, id: &JobId, percent: u8, message: Option<String>) -> Result<()> {
        let slot = self.slot(id)?;
        let mut current = slot.lock();
        let mut next = current.clone();
        if !apply_progress(&mut next, percent, message) {
            return Ok(());
        }
        if let Some(files) = &self.files {
            files.write(&next)?;
        }
        *current = next;
        Ok(())
    }

    fn count(&self) -> usize {
        self.jobs.read().len()
    }

    fn list(&self) -> Vec<Job> {
        let slots: Vec<_> = self.jobs.read().values().cloned().collect();
        let mut jobs: Vec<Job> = slots.iter().map(|s| s.lock().clone()).collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }
}
