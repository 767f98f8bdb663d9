//! Payment settlement: the only writer of paid statuses, debt, ledger and blocklist.

mod engine;

pub use engine::SettlementEngine;

use crate::error::SettlementError;
use crate::jobs::Job;
use serde::Serialize;

/// Settlement result shaped for HTTP responses.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<Job>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status_code: u16,
}

impl From<Result<Job, SettlementError>> for SettlementOutcome {
    fn from(result: Result<Job, SettlementError>) -> Self {
        match result {
            Ok(job) => Self {
                success: true,
                job: Some(job),
                error: None,
                status_code: 200,
            },
            Err(SettlementError::Store(err)) => {
                tracing::error!(error = %err, "settlement aborted");
                Self {
                    success: false,
                    job: None,
                    error: Some("settlement failed".into()),
                    status_code: 500,
                }
            }
            Err(err) => Self {
                success: false,
                job: None,
                status_code: err.status_code(),
                error: Some(err.to_string()),
            },
        }
    }
}
