//! Job-execution core of a Web Processing Service.
//!
//! Processes are registered in a [`process::ProcessRegistry`]. The
//! [`engine::ExecutionEngine`] validates requests, records jobs in a
//! [`job::JobStore`] and runs them asynchronously on a worker pool, while
//! [`facade::StatusFacade`] answers status and result queries.

pub mod artifact;
pub mod builtin;
pub mod config;
pub mod engine;
pub mod error;
pub mod facade;
pub mod job;
pub mod process;

pub use error::{FinchError, Result};
