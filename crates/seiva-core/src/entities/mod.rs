//! Entity structs for the canonical data model.

mod institution;
mod job;
mod process;
mod session;

pub use institution::{CredentialRef, Credentials, InstitutionConfig};
pub use job::{InvalidTransition, ProcessFilter, ScrapeJob, ScrapeScope};
pub use process::{Document, Movement, Process, ProcessSummary};
pub use session::{DEFAULT_TTL_MINUTES, Session, SessionCookie, SessionKey};
