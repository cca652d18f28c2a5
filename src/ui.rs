//! Terminal output of the `finch` binary: spinners and colored text.
//!
//! Uses `indicatif` for the progress spinner and `console` for colors.
//! [`JobProgress`] follows a submitted job until it finishes.

use std::sync::Arc;
use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use finch::facade::StatusReport;
use finch::job::{JobStatus, Output};
use finch::process::ProcessDescriptor;

/// Spinner tracking one job in the terminal.
pub struct JobProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl JobProgress {
    /// Starts the spinner for a freshly submitted job.
    pub fn start(process_id: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_message(format!("ACCEPTED: {process_id}"));
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Reflects the latest status and progress message.
    pub fn update(&self, report: &StatusReport) {
        let message = report.message.as_deref().unwrap_or_default();
        self.pb.set_message(format!(
            "{} {:>3}% {}: {message}",
            report.status, report.progress, report.process_id
        ));
    }

    /// Stops the spinner and prints the final status.
    pub fn complete(&self, report: &StatusReport) {
        self.pb.finish_and_clear();
        match report.status {
            JobStatus::Succeeded => println!(
                "  {} Job {} succeeded",
                self.green.apply_to("✓"),
                report.job_id
            ),
            JobStatus::Cancelled => println!(
                "  {} Job {} was cancelled",
                self.yellow.apply_to("⊘"),
                report.job_id
            ),
            _ => println!("  {} Job {} failed", self.red.apply_to("✗"), report.job_id),
        }
    }

    /// Prints the recorded outputs as JSON.
    pub fn print_outputs(&self, outputs: &[Output]) {
        println!();
        println!("{}", self.green.apply_to("─── Outputs ───"));
        println!("{}", serde_json::to_string_pretty(outputs).unwrap_or_default());
    }

    /// Prints the reason a job did not produce outputs.
    pub fn print_error(&self, error: &dyn std::fmt::Display) {
        println!("  {}", self.red.apply_to(error));
    }
}

/// Prints one line per process with its inputs and outputs.
pub fn print_processes(processes: impl IntoIterator<Item = Arc<ProcessDescriptor>>) {
    let bold = Style::new().bold();
    let dim = Style::new().dim();
    for process in processes {
        let inputs: Vec<String> = process
            .inputs
            .iter()
            .map(|p| {
                let marker = if p.required { "" } else { "?" };
                format!("{}{marker}: {}", p.name, p.value_type)
            })
            .collect();
        let outputs: Vec<&str> = process.outputs.iter().map(|p| p.name.as_str()).collect();
        println!(
            "{} {} ({}) -> {}",
            bold.apply_to(&process.id),
            dim.apply_to(&process.version),
            inputs.join(", "),
            outputs.join(", ")
        );
        if !process.abstract_text.is_empty() {
            println!("    {}", process.abstract_text);
        }
    }
}
