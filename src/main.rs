mod cli;
mod ui;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use cli::{Cli, Command};
use finch::artifact::LocalArtifactStore;
use finch::builtin::register_builtins;
use finch::config::FinchConfig;
use finch::engine::ExecutionEngine;
use finch::job::{JobStatus, JobStore, LocalJobStore};
use finch::process::{Inputs, ProcessRegistry};
use ui::JobProgress;

/// Interval between status polls while a job runs.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => {
            let mut config = FinchConfig::load_from(path)?;
            config.apply_overrides(|name| std::env::var(name).ok())?;
            config
        }
        None => FinchConfig::load()?,
    };
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }

    let registry = Arc::new(ProcessRegistry::new());
    register_builtins(&registry)?;

    match cli.command {
        Command::Processes => ui::print_processes(registry.list()),
        Command::Run { process, inputs } => {
            let descriptor = registry.lookup(&process)?;
            let inputs = cli::typed_inputs(&descriptor, &inputs)?;
            let engine = start_engine(&config, registry)?;
            let outcome = run_job(&engine, &process, inputs).await;
            engine.shutdown().await;
            outcome?;
        }
        Command::Demo => {
            let engine = start_engine(&config, registry)?;
            let inputs = Inputs::new().with("a", 2i64).with("b", 3i64);
            let outcome = run_job(&engine, "add", inputs).await;
            engine.shutdown().await;
            outcome?;
        }
    }
    Ok(())
}

/// Logs go to stderr so that JSON results on stdout stay clean.
fn init_tracing(verbose: bool) {
    let default = if verbose { "finch=debug" } else { "finch=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .init();
}

fn start_engine(config: &FinchConfig, registry: Arc<ProcessRegistry>) -> Result<ExecutionEngine> {
    let store: Arc<dyn JobStore> = match &config.store_dir {
        Some(dir) => Arc::new(
            LocalJobStore::open(Arc::clone(&registry), dir)
                .with_context(|| format!("opening job store at {}", dir.display()))?,
        ),
        None => Arc::new(LocalJobStore::in_memory(Arc::clone(&registry))),
    };
    let artifacts = Arc::new(LocalArtifactStore::new(
        &config.output_dir,
        config.output_url.clone(),
    ));
    Ok(ExecutionEngine::start(
        registry,
        store,
        artifacts,
        config.engine_config(),
    ))
}

/// Submits a job and follows it to completion; Ctrl-C requests cancellation.
async fn run_job(engine: &ExecutionEngine, process_id: &str, inputs: Inputs) -> Result<()> {
    let job_id = engine.submit(process_id, inputs).await?;
    let facade = engine.facade();
    let progress = JobProgress::start(process_id);

    let mut interrupted = false;
    let report = loop {
        let report = facade.status(&job_id)?;
        progress.update(&report);
        if report.status.is_terminal() {
            break report;
        }
        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                let status = engine.cancel(&job_id).await?;
                tracing::info!(job_id = %job_id, %status, "Cancellation requested from terminal");
            }
        }
    };
    progress.complete(&report);

    match facade.result(&job_id) {
        Ok(outputs) => {
            progress.print_outputs(&outputs);
            Ok(())
        }
        Err(e) => {
            progress.print_error(&e);
            if report.status == JobStatus::Cancelled {
                bail!("job {job_id} was cancelled");
            }
            bail!("job {job_id} failed");
        }
    }
}
