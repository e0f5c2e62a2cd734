//! Item lifecycle and job execution.
//!
//! [`machine`] advances a single item one stage at a time; [`scheduler`]
//! owns the worker pool that drives whole batches through it.

pub mod machine;
pub mod scheduler;

pub use machine::{StageOutcome, run_stage};
pub use scheduler::{JobHandle, JobId, JobReport, JobScheduler};
