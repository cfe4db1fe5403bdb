//! Per-job outcomes and the batch result map.
//!
//! These are the boundary types handed to the HTTP API collaborator: every
//! institution in a batch gets either a canonical result set or a typed
//! failure descriptor, never an all-or-nothing answer.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::entities::Process;
use crate::errors::ScrapeError;

/// Canonical result set for one successful job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ScrapeResult {
    pub institution_id: String,
    pub processes: Vec<Process>,
    /// Listing pages actually fetched (useful to spot the safety bound).
    pub pages_fetched: u32,
}

/// Typed failure descriptor for one failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FailureReport {
    /// Stable tag from [`ScrapeError::kind`].
    pub kind: String,
    /// Human-readable message.
    pub message: String,
    /// Whether the failure class is retryable in principle.
    pub retryable: bool,
    /// Attempts made before giving up.
    pub attempts: u32,
}

impl FailureReport {
    /// Build a report from the error that terminated a job.
    #[must_use]
    pub fn from_error(error: &ScrapeError, attempts: u32) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
            retryable: error.is_retryable(),
            attempts,
        }
    }
}

/// Outcome of one job: data or a typed failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobOutcome {
    pub job_id: String,
    pub institution_id: String,
    #[serde(flatten)]
    pub result: OutcomeKind,
}

/// The two terminal shapes of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OutcomeKind {
    Succeeded { result: ScrapeResult },
    Failed { failure: FailureReport },
}

impl JobOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.result, OutcomeKind::Succeeded { .. })
    }

    /// The failure report, when the job failed.
    #[must_use]
    pub const fn failure(&self) -> Option<&FailureReport> {
        match &self.result {
            OutcomeKind::Failed { failure } => Some(failure),
            OutcomeKind::Succeeded { .. } => None,
        }
    }

    /// The result set, when the job succeeded.
    #[must_use]
    pub const fn success(&self) -> Option<&ScrapeResult> {
        match &self.result {
            OutcomeKind::Succeeded { result } => Some(result),
            OutcomeKind::Failed { .. } => None,
        }
    }
}

/// Per-institution outcome map for one batch request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct BatchResult {
    pub outcomes: HashMap<String, JobOutcome>,
}

impl BatchResult {
    /// Whether every job in the batch succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.values().all(JobOutcome::is_success)
    }
}
