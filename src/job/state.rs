use chrono::Utc;

use super::model::{ErrorDetail, FailureKind, Job, JobStatus};
use crate::error::{FinchError, Result};

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether a job may move from `self` to `next`.
    ///
    /// Jobs flow ACCEPTED → RUNNING → {SUCCEEDED | FAILED | CANCELLED}. An
    /// accepted job may also be cancelled before it starts. Terminal states
    /// have no successors.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Accepted, JobStatus::Running)
                | (JobStatus::Accepted, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Succeeded)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }
}

/// Applies a status change to `job`, keeping its bookkeeping consistent.
///
/// Outputs survive only on `SUCCEEDED`; the error detail is set only on
/// `FAILED`.
pub(crate) fn apply_transition(
    job: &mut Job,
    next: JobStatus,
    detail: Option<ErrorDetail>,
) -> Result<()> {
    if !job.status.can_transition_to(next) {
        return Err(FinchError::InvalidTransition {
            job_id: job.id,
            from: job.status,
            to: next,
        });
    }

    let now = Utc::now();
    match next {
        JobStatus::Running => job.started_at = Some(now),
        JobStatus::Succeeded => {
            job.progress = 100;
            job.finished_at = Some(now);
        }
        JobStatus::Failed => {
            job.outputs.clear();
            job.error = Some(detail.unwrap_or_else(|| {
                ErrorDetail::new(FailureKind::Handler, "no error detail recorded")
            }));
            job.finished_at = Some(now);
        }
        JobStatus::Cancelled => {
            job.outputs.clear();
            job.finished_at = Some(now);
        }
        JobStatus::Accepted => {}
    }

    job.status = next;
    job.status_history.push(next);
    job.updated_at = now;
    Ok(())
}

/// Raises progress, ignoring regressions. Only meaningful while running.
pub(crate) fn apply_progress(job: &mut Job, percent: u8, message: Option<String>) -> bool {
    if job.status != JobStatus::Running {
        return false;
    }
    job.progress = job.progress.max(percent.min(100));
    if message.is_some() {
        job.message = message;
    }
    job.updated_at = Utc::now();
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Output;
    use crate::process::Inputs;

    fn make_job() -> Job {
        Job::new("add", Inputs::new())
    }

    #[test]
    fn happy_path_walks_all_states() {
        let mut job = make_job();
        apply_transition(&mut job, JobStatus::Running, None).unwrap();
        assert!(job.started_at.is_some());

        apply_transition(&mut job, JobStatus::Succeeded, None).unwrap();
        assert_eq!(job.progress, 100);
        assert!(job.finished_at.is_some());
        assert_eq!(
            job.status_history,
            vec![JobStatus::Accepted, JobStatus::Running, JobStatus::Succeeded]
        );
    }

    #[test]
    fn terminal_states_have_no_successors() {
        let all = [
            JobStatus::Accepted,
            JobStatus::Running,
            JobStatus::Succeeded,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ];
        for terminal in [JobStatus::Succeeded, JobStatus::Failed, JobStatus::Cancelled] {
            assert!(terminal.is_terminal());
            for next in all {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn succeeded_cannot_return_to_running() {
        let mut job = make_job();
        apply_transition(&mut job, JobStatus::Running, None).unwrap();
        apply_transition(&mut job, JobStatus::Succeeded, None).unwrap();

        let err = apply_transition(&mut job, JobStatus::Running, None).unwrap_err();
        assert!(matches!(
            err,
            FinchError::InvalidTransition {
                from: JobStatus::Succeeded,
                to: JobStatus::Running,
                ..
            }
        ));
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.status_history.len(), 3);
    }

    #[test]
    fn accepted_cannot_skip_to_succeeded() {
        let mut job = make_job();
        assert!(apply_transition(&mut job, JobStatus::Succeeded, None).is_err());
        assert!(apply_transition(&mut job, JobStatus::Failed, None).is_err());
        assert!(apply_transition(&mut job, JobStatus::Accepted, None).is_err());
    }

    #[test]
    fn accepted_can_be_cancelled() {
        let mut job = make_job();
        apply_transition(&mut job, JobStatus::Cancelled, None).unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.started_at.is_none());
    }

    #[test]
    fn failure_records_detail_and_drops_outputs() {
        let mut job = make_job();
        apply_transition(&mut job, JobStatus::Running, None).unwrap();
        job.outputs.push(Output::literal("sum", 5i64));

        let detail = ErrorDetail::new(FailureKind::Handler, "division by zero");
        apply_transition(&mut job, JobStatus::Failed, Some(detail.clone())).unwrap();
        assert_eq!(job.error, Some(detail));
        assert!(job.outputs.is_empty());
    }

    #[test]
    fn failure_without_detail_gets_placeholder() {
        let mut job = make_job();
        apply_transition(&mut job, JobStatus::Running, None).unwrap();
        apply_transition(&mut job, JobStatus::Failed, None).unwrap();
        assert_eq!(job.error.unwrap().kind, FailureKind::Handler);
    }

    #[test]
    fn progress_never_decreases() {
        let mut job = make_job();
        assert!(!apply_progress(&mut job, 10, None));
        assert_eq!(job.progress, 0);

        apply_transition(&mut job, JobStatus::Running, None).unwrap();
        assert!(apply_progress(&mut job, 40, Some("Opened dataset".into())));
        assert!(apply_progress(&mut job, 20, None));
        assert_eq!(job.progress, 40);
        assert_eq!(job.message.as_deref(), Some("Opened dataset"));

        apply_progress(&mut job, 250, None);
        assert_eq!(job.progress, 100);
    }
}
