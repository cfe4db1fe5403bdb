//! Credential resolution.
//!
//! Configuration never carries passwords. Each institution points at its
//! secret through a [`CredentialRef`]; a resolver dereferences it at login
//! time. Swapping the resolver (env vars, a secrets store, a test stub) is
//! the only change needed to move secret storage.

use seiva_core::{CredentialRef, Credentials, ScrapeError};

/// Turns a credential reference into secret material.
pub trait CredentialResolver: Send + Sync {
    /// # Errors
    ///
    /// [`ScrapeError::Credential`] when the reference cannot be resolved;
    /// the message names the reference, never the secret.
    fn resolve(&self, reference: &CredentialRef) -> Result<Credentials, ScrapeError>;
}

/// Resolves passwords from process environment variables. The variable name
/// is the reference's `secret_ref`; the username is its `account`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialResolver for EnvCredentials {
    fn resolve(&self, reference: &CredentialRef) -> Result<Credentials, ScrapeError> {
        let password =
            std::env::var(&reference.secret_ref).map_err(|_| ScrapeError::Credential {
                message: format!(
                    "environment variable {} is not set",
                    reference.secret_ref
                ),
            })?;
        if password.is_empty() {
            return Err(ScrapeError::Credential {
                message: format!("environment variable {} is empty", reference.secret_ref),
            });
        }
        Ok(Credentials {
            username: reference.account.clone(),
            password,
        })
    }
}
