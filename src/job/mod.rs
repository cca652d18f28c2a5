mod files;
mod model;
mod state;
mod store;

pub use model::{ErrorDetail, FailureKind, Job, JobId, JobStatus, Output, OutputData};
pub use store::{JobStore, LocalJobStore};
