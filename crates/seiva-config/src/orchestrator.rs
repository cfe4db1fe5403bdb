//! Job orchestrator tuning.

use serde::{Deserialize, Serialize};

const fn default_max_concurrent_jobs() -> usize {
    4
}

/// One concurrent job per institution: serializes interaction with a single
/// account's session and avoids hammering one deployment.
const fn default_per_institution_cap() -> usize {
    1
}

/// Attempts per job, including the initial one.
const fn default_max_attempts() -> u32 {
    4
}

const fn default_base_delay_ms() -> u64 {
    500
}

const fn default_max_delay_secs() -> u64 {
    30
}

/// Pagination safety bound. Guards against structural drift turning a
/// listing into an infinite sequence.
const fn default_max_pages() -> u32 {
    50
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestratorConfig {
    /// Global concurrent job bound across all institutions.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Concurrent job bound per institution.
    #[serde(default = "default_per_institution_cap")]
    pub per_institution_cap: usize,

    /// Attempts per job (initial + retries) for retryable failures.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff delay in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Backoff delay cap in seconds.
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,

    /// Maximum listing pages fetched per job.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            per_institution_cap: default_per_institution_cap(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
            max_pages: default_max_pages(),
        }
    }
}
