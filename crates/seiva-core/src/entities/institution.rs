//! Institution configuration and credential types.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::enums::SeiVersion;

/// One configured SEI deployment. Immutable once loaded; owned by the
/// orchestrator for the duration of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstitutionConfig {
    /// Short stable identifier (e.g. `trf1`, `ufmg`). Keys batch outcomes.
    pub id: String,
    /// Human-readable institution name.
    pub name: String,
    /// Portal root, no trailing slash (e.g. `https://sei.trf1.jus.br`).
    pub base_url: String,
    /// Declared family + minor version of the deployment.
    pub version: SeiVersion,
    /// Opaque pointer to externally resolved credentials.
    pub credentials: CredentialRef,
}

/// Opaque reference to credentials resolved outside the core (env var,
/// secrets store). Never carries the secret itself, so it is safe to clone,
/// log, and serialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRef {
    /// Portal account name. Part of the session cache key.
    pub account: String,
    /// Resolver-specific locator for the secret (for the env resolver, the
    /// name of the environment variable holding the password).
    pub secret_ref: String,
}

/// Resolved secret material. Lives only for the duration of one
/// authenticate call. Not serializable; `Debug` redacts the password.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_redacts_password() {
        let creds = Credentials {
            username: "scraper.svc".into(),
            password: "hunter2".into(),
        };
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("scraper.svc"));
        assert!(!rendered.contains("hunter2"));
    }
}
