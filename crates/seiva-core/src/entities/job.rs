//! Scrape jobs and their status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::enums::JobStatus;

/// Listing scope for a job: which processes to page through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessFilter {
    /// Portal status label filter (e.g. `open`).
    pub status: Option<String>,
    /// Restrict to processes held by one organizational unit.
    pub unit: Option<String>,
    /// Only processes updated since this instant.
    pub updated_since: Option<DateTime<Utc>>,
}

/// Requested scope for one scrape job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeScope {
    pub filter: ProcessFilter,
    /// Per-request override of the configured pagination safety bound.
    pub max_pages: Option<u32>,
}

/// Attempted status transition not permitted by the state machine.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid job transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// One unit of scheduled scraping work.
///
/// Status transitions are the only mutations, and they are monotonic:
/// once a job reaches `succeeded` or `failed` it never changes again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeJob {
    pub id: String,
    pub institution_id: String,
    pub scope: ScrapeScope,
    pub status: JobStatus,
    /// Attempts started so far (including the current one).
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScrapeJob {
    /// Create a new job in `pending`.
    #[must_use]
    pub fn new(id: impl Into<String>, institution_id: impl Into<String>, scope: ScrapeScope) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            institution_id: institution_id.into(),
            scope,
            status: JobStatus::Pending,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition to `next`, rejecting anything the state machine forbids.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] when `next` is not reachable from the
    /// current status.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}
