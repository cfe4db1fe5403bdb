//! # seiva-core
//!
//! Canonical SEI data model, error taxonomy, and job state machine for Seiva.
//!
//! This crate provides the version-independent types shared across all Seiva
//! crates:
//! - Canonical records extracted from any SEI deployment (processes,
//!   documents, movements)
//! - Session and credential types with redacted debug output
//! - The `ScrapeError` taxonomy every other crate maps into
//! - The `ScrapeJob` status state machine
//! - Outcome/failure types handed to the API and persistence collaborators
//!
//! Nothing in here knows which SEI version produced a record. Adapters
//! normalize into these types; downstream consumers never branch on version.

pub mod entities;
pub mod enums;
pub mod errors;
pub mod outcome;

pub use entities::{
    CredentialRef, Credentials, DEFAULT_TTL_MINUTES, Document, InstitutionConfig,
    InvalidTransition, Movement, Process, ProcessFilter, ProcessSummary, ScrapeJob, ScrapeScope,
    Session, SessionCookie, SessionKey,
};
pub use enums::{JobStatus, SeiVersion, VersionFamily};
pub use errors::ScrapeError;
pub use outcome::{BatchResult, FailureReport, JobOutcome, OutcomeKind, ScrapeResult};
