//! Command-line interface of the `finch` binary, built on clap.
//!
//! Defines the [`Cli`] struct with its [`Command`] subcommands (processes,
//! run, demo) and global flags (--config, --workers, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use finch::error::{FinchError, Result};
use finch::process::{Inputs, ProcessDescriptor, Value};

/// finch: runs Web Processing Service jobs locally.
#[derive(Debug, Parser)]
#[command(name = "finch", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (defaults to finch.toml).
    #[arg(long, global = true, env = "FINCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of concurrent workers.
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Enables debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Lists the available processes.
    Processes,

    /// Submits a job and waits for it to finish.
    Run {
        /// Identifier of the process to execute.
        process: String,

        /// Input as name=value; repeat for several inputs or occurrences.
        #[arg(short, long = "input", value_parser = parse_input)]
        inputs: Vec<(String, String)>,
    },

    /// Runs the built-in `add` scenario.
    Demo,
}

fn parse_input(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected name=value, got '{raw}'")),
    }
}

/// Types raw command-line values after the inputs the process declares.
///
/// Names the process does not declare are passed on as strings so that
/// validation reports them.
pub fn typed_inputs(descriptor: &ProcessDescriptor, raw: &[(String, String)]) -> Result<Inputs> {
    let mut inputs = Inputs::new();
    for (name, text) in raw {
        let value = match descriptor.input(name) {
            Some(param) => Value::parse_as(text, param.value_type).ok_or_else(|| {
                FinchError::InvalidInput {
                    parameter: name.clone(),
                    reason: format!("'{text}' is not a valid {}", param.value_type),
                }
            })?,
            None => Value::String(text.clone()),
        };
        inputs.push(name.clone(), value);
    }
    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_run_subcommand() {
        let cli = Cli::parse_from(["finch", "run", "add", "-i", "a=2", "--input", "b=3"]);
        match cli.command {
            Command::Run { process, inputs } => {
                assert_eq!(process, "add");
                assert_eq!(
                    inputs,
                    vec![
                        ("a".to_string(), "2".to_string()),
                        ("b".to_string(), "3".to_string())
                    ]
                );
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn cli_rejects_malformed_input() {
        assert!(Cli::try_parse_from(["finch", "run", "add", "-i", "a"]).is_err());
        assert!(Cli::try_parse_from(["finch", "run", "add", "-i", "=2"]).is_err());
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "finch",
            "--config",
            "/etc/finch.toml",
            "--workers",
            "2",
            "--verbose",
            "demo",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.workers, Some(2));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/finch.toml")));
        assert!(matches!(cli.command, Command::Demo));
    }

    #[test]
    fn typed_inputs_follow_descriptor() {
        let descriptor = finch::builtin::add().unwrap();
        let raw = vec![
            ("a".to_string(), "2".to_string()),
            ("b".to_string(), "-3".to_string()),
        ];
        let inputs = typed_inputs(&descriptor, &raw).unwrap();
        assert_eq!(inputs.get("a"), Some(&Value::Integer(2)));
        assert_eq!(inputs.get("b"), Some(&Value::Integer(-3)));

        let raw = vec![("a".to_string(), "two".to_string())];
        assert!(matches!(
            typed_inputs(&descriptor, &raw),
            Err(FinchError::InvalidInput { parameter, .. }) if parameter == "a"
        ));

        let raw = vec![("c".to_string(), "1".to_string())];
        let inputs = typed_inputs(&descriptor, &raw).unwrap();
        assert_eq!(inputs.get("c"), Some(&Value::String("1".into())));
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
