//! # seiva-session
//!
//! Credential resolution and session lifecycle for the scraping core.
//!
//! Institutions are configured with an opaque [`seiva_core::CredentialRef`];
//! a [`CredentialResolver`] turns it into secret material immediately before
//! the login call, and the material is dropped as soon as `authenticate`
//! returns. The [`SessionManager`] caches at most one live [`seiva_core::Session`]
//! per (institution, account) pair, serializes logins for the same pair, and
//! transparently re-authenticates once when a portal expires a session
//! mid-operation.

pub mod manager;
pub mod resolver;

pub use manager::{SessionManager, SessionOptions};
pub use resolver::{CredentialResolver, EnvCredentials};
