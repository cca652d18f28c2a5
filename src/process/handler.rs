//! The capability interface between the execution engine and process handlers.
//!
//! A handler receives a [`HandlerContext`] holding its bound inputs, a private
//! working directory and a cancellation token. Cancellation is cooperative:
//! long-running handlers are expected to poll [`HandlerContext::is_cancelled`]
//! (or await [`HandlerContext::cancelled`]) and return
//! [`HandlerError::Cancelled`]. A handler that ignores the flag runs to
//! completion and its result is discarded.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::value::{Inputs, Value};
use crate::job::{JobId, JobStore};

/// Name of the per-job log file inside the working directory.
pub const LOG_FILE: &str = "log.txt";

/// Errors a handler may return. All of them end the job as `FAILED`,
/// except [`HandlerError::Cancelled`] when cancellation was requested.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("handler observed cancellation")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

/// One output produced by a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutput {
    /// Inline literal data.
    Literal { name: String, value: Value },
    /// A file in the working directory, staged by the engine and recorded by location.
    File { name: String, path: PathBuf },
}

impl HandlerOutput {
    pub fn literal(name: impl Into<String>, value: impl Into<Value>) -> Self {
        HandlerOutput::Literal {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        HandlerOutput::File {
            name: name.into(),
            path: path.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            HandlerOutput::Literal { name, .. } | HandlerOutput::File { name, .. } => name,
        }
    }
}

/// Everything a handler may touch while it runs.
#[derive(Clone)]
pub struct HandlerContext {
    job_id: JobId,
    process_id: String,
    inputs: Inputs,
    workdir: PathBuf,
    cancellation: CancellationToken,
    store: Arc<dyn JobStore>,
}

impl HandlerContext {
    pub(crate) fn new(
        job_id: JobId,
        process_id: String,
        inputs: Inputs,
        workdir: PathBuf,
        cancellation: CancellationToken,
        store: Arc<dyn JobStore>,
    ) -> Self {
        Self {
            job_id,
            process_id,
            inputs,
            workdir,
            cancellation,
            store,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    /// Inputs after validation, with declared defaults applied.
    pub fn inputs(&self) -> &Inputs {
        &self.inputs
    }

    /// Private scratch directory for this job.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    /// Returns `Err(Cancelled)` if cancellation was requested, for use with `?`.
    pub fn check_cancelled(&self) -> Result<(), HandlerError> {
        if self.is_cancelled() {
            Err(HandlerError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Reports progress. Values below the current progress are ignored.
    ///
    /// The store may write to disk, so the update runs on the blocking pool.
    pub async fn progress(&self, percent: u8, message: impl Into<String>) {
        let store = Arc::clone(&self.store);
        let job_id = self.job_id;
        let message = message.into();
        let recorded = tokio::task::spawn_blocking(move || {
            store.update_progress(&job_id, percent, Some(message))
        })
        .await;
        match recorded {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(job_id = %self.job_id, error = %e, "Failed to record progress")
            }
            Err(e) => {
                tracing::warn!(job_id = %self.job_id, error = %e, "Progress update task failed")
            }
        }
    }

    /// Appends a line to the job's log file and mirrors it to the tracing log.
    pub async fn log(&self, message: &str) -> std::io::Result<()> {
        tracing::info!(job_id = %self.job_id, process = %self.process_id, "{message}");
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.workdir.join(LOG_FILE))
            .await?;
        file.write_all(format!("{message}\n").as_bytes()).await?;
        Ok(())
    }

    /// Logs `message` and reports it as the current progress step.
    pub async fn log_progress(&self, message: &str, percent: u8) -> std::io::Result<()> {
        self.log(message).await?;
        self.progress(percent, message).await;
        Ok(())
    }
}

/// Executable logic bound to a process.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: HandlerContext) -> Result<Vec<HandlerOutput>, HandlerError>;
}

/// Adapter turning an async closure into a [`Handler`].
pub struct FnHandler<F>(F);

pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(HandlerContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<HandlerOutput>, HandlerError>> + Send,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(HandlerContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<HandlerOutput>, HandlerError>> + Send,
{
    async fn handle(&self, ctx: HandlerContext) -> Result<Vec<HandlerOutput>, HandlerError> {
        (self.0)(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobStatus, LocalJobStore};
    use crate::process::ProcessRegistry;
    use crate::process::ProcessDescriptor;

    fn context(dir: &Path) -> (HandlerContext, Arc<LocalJobStore>, CancellationToken) {
        let registry = Arc::new(ProcessRegistry::new());
        registry
            .register(
                ProcessDescriptor::builder("noop")
                    .handler(handler_fn(|_ctx| async { Ok(Vec::new()) }))
                    .unwrap(),
            )
            .unwrap();
        let store = Arc::new(LocalJobStore::in_memory(registry));
        let id = store.create("noop", Inputs::new()).unwrap();
        store.transition(&id, JobStatus::Running, None).unwrap();
        let token = CancellationToken::new();
        let ctx = HandlerContext::new(
            id,
            "noop".into(),
            Inputs::new(),
            dir.to_path_buf(),
            token.clone(),
            store.clone(),
        );
        (ctx, store, token)
    }

    #[tokio::test]
    async fn log_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _, _) = context(dir.path());
        ctx.log("Processing started").await.unwrap();
        ctx.log("Processing finished").await.unwrap();

        let text = std::fs::read_to_string(dir.path().join(LOG_FILE)).unwrap();
        assert_eq!(text, "Processing started\nProcessing finished\n");
    }

    #[tokio::test]
    async fn progress_is_recorded_on_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, store, _) = context(dir.path());
        ctx.log_progress("Zipping file 1 of 2", 90).await.unwrap();

        let job = store.get(&ctx.job_id()).unwrap();
        assert_eq!(job.progress, 90);
        assert_eq!(job.message.as_deref(), Some("Zipping file 1 of 2"));
    }

    #[tokio::test]
    async fn progress_is_written_through_a_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ProcessRegistry::new());
        registry
            .register(
                ProcessDescriptor::builder("noop")
                    .handler(handler_fn(|_ctx| async { Ok(Vec::new()) }))
                    .unwrap(),
            )
            .unwrap();
        let jobs = dir.path().join("jobs");
        let store = Arc::new(LocalJobStore::open(Arc::clone(&registry), &jobs).unwrap());
        let id = store.create("noop", Inputs::new()).unwrap();
        store.transition(&id, JobStatus::Running, None).unwrap();

        let ctx = HandlerContext::new(
            id,
            "noop".into(),
            Inputs::new(),
            dir.path().to_path_buf(),
            CancellationToken::new(),
            store,
        );
        ctx.progress(40, "Subsetting").await;

        let reopened = LocalJobStore::open(registry, &jobs).unwrap();
        let job = reopened.get(&id).unwrap();
        assert_eq!(job.progress, 40);
        assert_eq!(job.message.as_deref(), Some("Subsetting"));
    }

    #[test]
    fn check_cancelled_follows_token() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _, token) = context(dir.path());
        assert!(ctx.check_cancelled().is_ok());
        token.cancel();
        assert!(matches!(ctx.check_cancelled(), Err(HandlerError::Cancelled)));
    }

    #[test]
    fn output_names() {
        assert_eq!(HandlerOutput::literal("sum", 5i64).name(), "sum");
        assert_eq!(HandlerOutput::file("output", "/tmp/out.nc").name(), "output");
    }
}
