use std::any::Any;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::Shared;
use crate::error::FinchError;
use crate::job::{ErrorDetail, FailureKind, JobId, JobStatus, Output};
use crate::process::{HandlerContext, HandlerOutput, Inputs, ProcessDescriptor};

/// How a job's execution ended, before it is written to the store.
#[derive(Debug)]
enum Outcome {
    Succeeded(Vec<Output>),
    Failed(ErrorDetail),
    Cancelled,
}

pub(super) type Queue = Arc<AsyncMutex<mpsc::UnboundedReceiver<JobId>>>;

/// Pulls job ids off the shared queue until it is closed and drained.
pub(super) async fn run_worker(shared: Arc<Shared>, queue: Queue, index: usize) {
    tracing::debug!(worker = index, "Worker started");
    loop {
        let next = queue.lock().await.recv().await;
        let Some(job_id) = next else { break };
        shared.execute(job_id).await;
    }
    tracing::debug!(worker = index, "Worker stopped");
}

impl Shared {
    async fn execute(&self, job_id: JobId) {
        let token = self.token_for(job_id);
        if token.is_cancelled() {
            tracing::debug!(job_id = %job_id, "Skipping job cancelled before start");
            // Normally already done by `cancel`; covers a store outage during it.
            let _ = self.store.transition_from(
                &job_id,
                JobStatus::Accepted,
                JobStatus::Cancelled,
                None,
            );
            self.forget(job_id);
            return;
        }

        let job = match self
            .retry
            .run("transition", || {
                self.store.transition(&job_id, JobStatus::Running, None)
            })
            .await
        {
            Ok(job) => job,
            Err(FinchError::InvalidTransition { from, .. }) => {
                tracing::debug!(job_id = %job_id, status = %from, "Job no longer runnable");
                self.forget(job_id);
                return;
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Could not start job");
                self.forget(job_id);
                return;
            }
        };
        tracing::info!(job_id = %job_id, process = %job.process_id, "Job running");

        let outcome = match self.registry.lookup(&job.process_id) {
            Ok(descriptor) => self.run_handler(job_id, &descriptor, job.inputs, &token).await,
            Err(e) => Outcome::Failed(ErrorDetail::new(FailureKind::Contract, e.to_string())),
        };
        self.finalize(job_id, outcome).await;
        self.forget(job_id);
    }

    async fn run_handler(
        &self,
        job_id: JobId,
        descriptor: &ProcessDescriptor,
        inputs: Inputs,
        token: &CancellationToken,
    ) -> Outcome {
        let workdir = self.workdir.join(job_id.to_string());
        if let Err(e) = tokio::fs::create_dir_all(&workdir).await {
            return Outcome::Failed(ErrorDetail::new(
                FailureKind::Staging,
                format!("cannot create working directory {}: {e}", workdir.display()),
            ));
        }

        let ctx = HandlerContext::new(
            job_id,
            descriptor.id.clone(),
            inputs,
            workdir.clone(),
            token.clone(),
            Arc::clone(&self.store),
        );
        let handler = descriptor.handler();
        let mut task = tokio::spawn(async move { handler.handle(ctx).await });

        let limit = descriptor.max_duration.or(self.default_timeout);
        let joined = match limit {
            Some(limit) => match timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    task.abort();
                    token.cancel();
                    tracing::warn!(job_id = %job_id, limit_ms = limit.as_millis() as u64, "Job timed out");
                    return Outcome::Failed(ErrorDetail::new(
                        FailureKind::Timeout,
                        format!("exceeded maximum duration of {}", format_duration(limit)),
                    ));
                }
            },
            None => task.await,
        };

        let result = match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                tracing::error!(job_id = %job_id, %message, "Handler panicked");
                return Outcome::Failed(ErrorDetail::new(FailureKind::Panic, message));
            }
            Err(e) => return Outcome::Failed(ErrorDetail::new(FailureKind::Handler, e.to_string())),
        };

        if token.is_cancelled() {
            if result.is_ok() {
                tracing::info!(job_id = %job_id, "Discarding result of cancelled job");
            }
            return Outcome::Cancelled;
        }

        match result {
            Ok(outputs) => self.stage_outputs(job_id, descriptor, &workdir, outputs).await,
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Handler failed");
                Outcome::Failed(ErrorDetail::new(FailureKind::Handler, e.to_string()))
            }
        }
    }

    /// Checks handler outputs against the descriptor and publishes file outputs.
    async fn stage_outputs(
        &self,
        job_id: JobId,
        descriptor: &ProcessDescriptor,
        workdir: &Path,
        outputs: Vec<HandlerOutput>,
    ) -> Outcome {
        let mut staged = Vec::with_capacity(outputs.len());
        for output in outputs {
            let Some(declared) = descriptor.output(output.name()) else {
                return Outcome::Failed(ErrorDetail::new(
                    FailureKind::Contract,
                    format!("handler produced undeclared output '{}'", output.name()),
                ));
            };

            match output {
                HandlerOutput::Literal { name, value } => {
                    let Some(value) = value.coerce(declared.value_type) else {
                        return Outcome::Failed(ErrorDetail::new(
                            FailureKind::Contract,
                            format!(
                                "output '{name}' should be {}, got {}",
                                declared.value_type,
                                value.value_type()
                            ),
                        ));
                    };
                    staged.push(Output::literal(name, value));
                }
                HandlerOutput::File { name, path } => {
                    let path = if path.is_relative() {
                        workdir.join(path)
                    } else {
                        path
                    };
                    let artifacts = Arc::clone(&self.artifacts);
                    let output_name = name.clone();
                    let location = tokio::task::spawn_blocking(move || {
                        artifacts.stage(&job_id, &output_name, &path)
                    })
                    .await;
                    match location {
                        Ok(Ok(location)) => staged.push(Output::reference(name, location)),
                        Ok(Err(e)) => {
                            return Outcome::Failed(ErrorDetail::new(
                                FailureKind::Staging,
                                e.to_string(),
                            ));
                        }
                        Err(e) => {
                            return Outcome::Failed(ErrorDetail::new(
                                FailureKind::Staging,
                                format!("staging task failed: {e}"),
                            ));
                        }
                    }
                }
            }
        }
        Outcome::Succeeded(staged)
    }

    async fn finalize(&self, job_id: JobId, outcome: Outcome) {
        let result = match outcome {
            Outcome::Succeeded(outputs) => {
                let mut recorded = Ok(());
                for output in outputs {
                    recorded = self
                        .retry
                        .run("append_output", || {
                            self.store.append_output(&job_id, output.clone())
                        })
                        .await;
                    if recorded.is_err() {
                        break;
                    }
                }
                match recorded {
                    Ok(()) => {
                        self.retry
                            .run("transition", || {
                                self.store.transition(&job_id, JobStatus::Succeeded, None)
                            })
                            .await
                    }
                    Err(e) => Err(e),
                }
            }
            Outcome::Failed(detail) => {
                self.retry
                    .run("transition", || {
                        self.store
                            .transition(&job_id, JobStatus::Failed, Some(detail.clone()))
                    })
                    .await
            }
            Outcome::Cancelled => {
                self.retry
                    .run("transition", || {
                        self.store.transition(&job_id, JobStatus::Cancelled, None)
                    })
                    .await
            }
        };

        match result {
            Ok(job) => match &job.error {
                Some(detail) => {
                    tracing::info!(job_id = %job_id, status = %job.status, error = %detail, "Job finished")
                }
                None => tracing::info!(
                    job_id = %job_id,
                    status = %job.status,
                    duration_ms = job.duration_ms().unwrap_or_default(),
                    "Job finished"
                ),
            },
            Err(FinchError::InvalidTransition { from, .. }) => {
                tracing::debug!(job_id = %job_id, status = %from, "Job was finalized elsewhere");
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Could not record job outcome");
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}

fn format_duration(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}
