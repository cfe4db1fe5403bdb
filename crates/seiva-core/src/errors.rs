//! Cross-cutting error taxonomy.
//!
//! Every failure an adapter, the session manager, or the orchestrator can
//! surface is one of these variants. The orchestrator retries only
//! [`ScrapeError::is_retryable`] errors; everything else is terminal for the
//! job. `Structure` is deliberately distinct from `Auth` and `NotFound`: it
//! means the portal markup no longer matches the adapter and the adapter
//! itself needs updating, so it must never be retried as if transient.

use thiserror::Error;

use crate::enums::VersionFamily;

/// Errors raised anywhere in the scraping core.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Login flow rejected the credentials.
    #[error("authentication failed: {message}")]
    Auth { message: String },

    /// Response markup did not match the shape this adapter expects.
    /// Signals structural drift in the portal, not a transient fault.
    #[error("unexpected page structure ({institution}, stage {stage}): {detail}")]
    Structure {
        institution: String,
        stage: String,
        detail: String,
    },

    /// Requested process or document does not exist on the portal.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Authenticated but forbidden from the requested resource.
    #[error("access denied: {message}")]
    Access { message: String },

    /// Timeout, rate limit, or 5xx. The only retryable class.
    #[error("transient portal failure: {message}")]
    Transient {
        message: String,
        /// Seconds the portal asked us to wait (from a 429 Retry-After).
        retry_after_secs: Option<u64>,
    },

    /// No adapter registered for the requested (family, minor) pair.
    #[error("unsupported SEI version: {family} minor {minor}")]
    UnsupportedVersion { family: VersionFamily, minor: u8 },

    /// The credential reference could not be resolved to a secret.
    #[error("credential resolution failed: {message}")]
    Credential { message: String },

    /// The portal no longer recognizes the session. Internal signal:
    /// intercepted by the session manager for one transparent re-login,
    /// never surfaced in a batch outcome.
    #[error("session expired")]
    SessionExpired,

    /// The job was cancelled by the caller.
    #[error("job cancelled")]
    Cancelled,
}

impl ScrapeError {
    /// Whether the orchestrator may retry the failed attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Stable snake_case tag used in failure reports and structured logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth_error",
            Self::Structure { .. } => "structure_error",
            Self::NotFound { .. } => "not_found",
            Self::Access { .. } => "access_error",
            Self::Transient { .. } => "transient_error",
            Self::UnsupportedVersion { .. } => "unsupported_version",
            Self::Credential { .. } => "credential_error",
            Self::SessionExpired => "session_expired",
            Self::Cancelled => "cancelled",
        }
    }

    /// Shorthand for an `Auth` failure.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Shorthand for a `Structure` failure with institution and stage context.
    pub fn structure(
        institution: impl Into<String>,
        stage: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::Structure {
            institution: institution.into(),
            stage: stage.into(),
            detail: detail.into(),
        }
    }

    /// Shorthand for a `Transient` failure without a Retry-After hint.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            retry_after_secs: None,
        }
    }

    /// Shorthand for an `Access` failure.
    pub fn access(message: impl Into<String>) -> Self {
        Self::Access {
            message: message.into(),
        }
    }

    /// Shorthand for a `NotFound` failure.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_is_retryable() {
        assert!(ScrapeError::transient("timeout").is_retryable());
        assert!(!ScrapeError::auth("bad credentials").is_retryable());
        assert!(!ScrapeError::structure("inst", "login", "missing token").is_retryable());
        assert!(!ScrapeError::Cancelled.is_retryable());
        assert!(!ScrapeError::SessionExpired.is_retryable());
        assert!(
            !ScrapeError::UnsupportedVersion {
                family: VersionFamily::V4,
                minor: 9,
            }
            .is_retryable()
        );
    }

    #[test]
    fn kinds_are_stable_tags() {
        assert_eq!(ScrapeError::auth("x").kind(), "auth_error");
        assert_eq!(ScrapeError::structure("a", "b", "c").kind(), "structure_error");
        assert_eq!(ScrapeError::Cancelled.kind(), "cancelled");
    }

    #[test]
    fn structure_error_carries_context() {
        let err = ScrapeError::structure("trf1", "listing", "pager nav missing");
        let text = err.to_string();
        assert!(text.contains("trf1"));
        assert!(text.contains("listing"));
        assert!(text.contains("pager nav missing"));
    }
}
