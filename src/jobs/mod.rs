//! Cancel/resume jobs: the typed lifecycle and its persisted store.

mod repository;
mod types;

pub use repository::JobStore;
pub(crate) use repository::{compare_and_set_status, fetch_job, record_transition};
pub use types::{
    Actor, AgentReport, Job, JobAction, JobStatus, NewJob, StatusChange, TriggerSource,
};

#[cfg(test)]
pub(crate) mod testing;
