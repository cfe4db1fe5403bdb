//! # seiva-orchestrator
//!
//! Concurrent execution of scrape jobs across institutions.
//!
//! A batch is one job per institution. Jobs run in parallel under a global
//! concurrency limit and a per-institution cap (politeness toward individual
//! portals), retry transient failures with capped exponential backoff, and
//! finish with a per-institution outcome map: one institution's failure
//! never discards another's data.

pub mod orchestrator;
pub mod retry;

pub use orchestrator::{Orchestrator, OrchestratorLimits};
pub use retry::RetryPolicy;
