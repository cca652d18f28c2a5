//! Demonstration processes shipped with the service.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;
use crate::process::{
    DEFAULT_ZIP_START, HandlerContext, HandlerError, HandlerOutput, InputParameter, LOG_FILE,
    OutputParameter, ProcessDescriptor, ProcessRegistry, ValueType, handler_fn,
};

/// Number of progress steps `sleep` reports.
const SLEEP_STEPS: u32 = 10;

/// Registers every built-in process.
pub fn register_builtins(registry: &ProcessRegistry) -> Result<()> {
    registry.register(add()?)?;
    registry.register(sleep()?)?;
    Ok(())
}

/// `add`: sums two integers.
pub fn add() -> Result<ProcessDescriptor> {
    ProcessDescriptor::builder("add")
        .title("Add")
        .version("1.0")
        .abstract_text("Returns the sum of two integers.")
        .input(InputParameter::required("a", ValueType::Integer))
        .input(InputParameter::required("b", ValueType::Integer))
        .output(OutputParameter::literal("sum", ValueType::Integer))
        .handler(handler_fn(|ctx: HandlerContext| async move {
            let a = integer(&ctx, "a")?;
            let b = integer(&ctx, "b")?;
            let sum = a
                .checked_add(b)
                .ok_or_else(|| HandlerError::failed(format!("{a} + {b} overflows")))?;
            Ok(vec![HandlerOutput::literal("sum", sum)])
        }))
}

/// `sleep`: waits for a number of seconds in steps, reporting progress.
///
/// Stops early when cancelled. On completion it writes a short report file
/// and publishes it, the job log, and a zip bundling both.
pub fn sleep() -> Result<ProcessDescriptor> {
    ProcessDescriptor::builder("sleep")
        .title("Sleep")
        .version("1.0")
        .abstract_text("Waits for the given number of seconds and writes a report.")
        .input(InputParameter::optional("seconds", ValueType::Float).with_default(1.0))
        .output(OutputParameter::reference("report"))
        .output(OutputParameter::reference("output_log"))
        .output(OutputParameter::reference("output_zip"))
        .handler(handler_fn(|ctx: HandlerContext| async move {
            let seconds = ctx
                .inputs()
                .get("seconds")
                .and_then(|v| v.as_f64())
                .unwrap_or(1.0);
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(HandlerError::failed(format!(
                    "seconds must be a non-negative number, got {seconds}"
                )));
            }

            let step = Duration::try_from_secs_f64(seconds / f64::from(SLEEP_STEPS))
                .map_err(|_| HandlerError::failed(format!("seconds is too large: {seconds}")))?;

            ctx.log_progress("Processing started", 0).await?;
            for i in 1..=SLEEP_STEPS {
                tokio::select! {
                    _ = ctx.cancelled() => {
                        ctx.log("Cancellation requested, stopping").await?;
                        return Err(HandlerError::Cancelled);
                    }
                    _ = tokio::time::sleep(step) => {}
                }
                let percent = u8::try_from(i * u32::from(DEFAULT_ZIP_START) / SLEEP_STEPS)
                    .unwrap_or(DEFAULT_ZIP_START);
                ctx.progress(percent, format!("Step {i} of {SLEEP_STEPS}")).await;
            }

            let report = ctx.workdir().join("report.txt");
            tokio::fs::write(&report, format!("slept for {seconds} seconds\n")).await?;
            let files = [report.clone(), PathBuf::from(LOG_FILE)];
            let archive = ctx
                .zip_files("output.zip", &files, DEFAULT_ZIP_START)
                .await?;
            ctx.log("Processing finished").await?;

            Ok(vec![
                HandlerOutput::file("report", report),
                HandlerOutput::file("output_log", LOG_FILE),
                HandlerOutput::file("output_zip", archive),
            ])
        }))
}

fn integer(ctx: &HandlerContext, name: &str) -> std::result::Result<i64, HandlerError> {
    ctx.inputs()
        .get(name)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerError::failed(format!("input '{name}' is not an integer")))
}
