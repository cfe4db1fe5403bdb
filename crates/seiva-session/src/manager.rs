//! Session cache and lifecycle.
//!
//! At most one live session exists per (institution, account) pair. Logins
//! for the same pair are serialized behind a per-key async mutex, so N
//! concurrent jobs against one institution produce exactly one login.
//!
//! Expiry is handled twice over: proactively, a cached session within the
//! configured buffer of its estimated expiry is re-established before use;
//! reactively, a session the portal rejects mid-operation triggers one
//! transparent re-login and replay through [`SessionManager::run_with_reauth`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Duration;
use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use seiva_adapters::VersionAdapter;
use seiva_core::{InstitutionConfig, ScrapeError, Session, SessionKey};

use crate::resolver::CredentialResolver;

/// Session lifetime knobs.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Assumed server-side idle timeout stamped on a fresh session.
    pub ttl_minutes: i64,
    /// Sessions within this many seconds of estimated expiry are
    /// re-established instead of reused.
    pub expiry_buffer_secs: i64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            ttl_minutes: seiva_core::DEFAULT_TTL_MINUTES,
            expiry_buffer_secs: 60,
        }
    }
}

/// The adapter is cached alongside its session so shutdown can log every
/// session out without re-resolving versions.
type Slot = Arc<tokio::sync::Mutex<Option<(Arc<dyn VersionAdapter>, Session)>>>;

/// Owns every live session in the process.
pub struct SessionManager {
    resolver: Arc<dyn CredentialResolver>,
    options: SessionOptions,
    slots: Mutex<HashMap<SessionKey, Slot>>,
}

impl SessionManager {
    #[must_use]
    pub fn new(resolver: Arc<dyn CredentialResolver>, options: SessionOptions) -> Self {
        Self {
            resolver,
            options,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, key: &SessionKey) -> Slot {
        let mut slots = self.slots.lock().expect("session cache lock poisoned");
        slots.entry(key.clone()).or_default().clone()
    }

    /// A live session for the institution, logging in if none is cached or
    /// the cached one is near expiry.
    ///
    /// # Errors
    ///
    /// Credential resolution failures as [`ScrapeError::Credential`]; login
    /// failures as the adapter reports them.
    pub async fn acquire(
        &self,
        adapter: Arc<dyn VersionAdapter>,
        institution: &InstitutionConfig,
    ) -> Result<Session, ScrapeError> {
        let key = SessionKey {
            institution_id: institution.id.clone(),
            account: institution.credentials.account.clone(),
        };
        let slot = self.slot(&key);
        let mut guard = slot.lock().await;

        if let Some((_, session)) = guard.as_ref() {
            if !session.is_expired(Duration::seconds(self.options.expiry_buffer_secs)) {
                debug!(
                    institution = %key.institution_id,
                    account = %key.account,
                    "reusing cached session"
                );
                return Ok(session.clone());
            }
            debug!(institution = %key.institution_id, "cached session near expiry");
        }

        let session = self.login(adapter.as_ref(), institution).await?;
        *guard = Some((adapter, session.clone()));
        Ok(session)
    }

    async fn login(
        &self,
        adapter: &dyn VersionAdapter,
        institution: &InstitutionConfig,
    ) -> Result<Session, ScrapeError> {
        let credentials = self.resolver.resolve(&institution.credentials)?;
        let mut session = adapter.authenticate(institution, &credentials).await?;
        // secret material drops here; only cookies and tokens survive
        session.expires_at =
            session.established_at + Duration::minutes(self.options.ttl_minutes);
        info!(
            institution = %institution.id,
            version = %institution.version,
            "session established"
        );
        Ok(session)
    }

    /// Drop the cached session for `key`, if any. Idempotent. Does not log
    /// the portal out: invalidation usually means the portal already
    /// discarded the session on its side.
    pub async fn invalidate(&self, key: &SessionKey) {
        let slot = self.slot(key);
        let mut guard = slot.lock().await;
        if guard.take().is_some() {
            debug!(institution = %key.institution_id, "session invalidated");
        }
    }

    /// Run `op` with a live session, re-authenticating once if the portal
    /// expires the session mid-operation. The operation must be restartable:
    /// on replay it runs from the beginning against the fresh session.
    ///
    /// # Errors
    ///
    /// Whatever `op` fails with, except [`ScrapeError::SessionExpired`]:
    /// one expiry is absorbed by re-login, and a second expiry immediately
    /// after a fresh login surfaces as [`ScrapeError::Auth`].
    pub async fn run_with_reauth<T>(
        &self,
        adapter: Arc<dyn VersionAdapter>,
        institution: &InstitutionConfig,
        op: impl Fn(Arc<dyn VersionAdapter>, Session) -> BoxFuture<'static, Result<T, ScrapeError>>,
    ) -> Result<T, ScrapeError> {
        let session = self.acquire(adapter.clone(), institution).await?;
        match op(adapter.clone(), session.clone()).await {
            Err(ScrapeError::SessionExpired) => {
                info!(
                    institution = %institution.id,
                    "session expired mid-operation, re-authenticating"
                );
                self.invalidate(&session.key()).await;
                let fresh = self.acquire(adapter.clone(), institution).await?;
                match op(adapter, fresh).await {
                    Err(ScrapeError::SessionExpired) => Err(ScrapeError::auth(
                        "portal expired a freshly established session",
                    )),
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Log every cached session out and clear the cache. Logout failures
    /// are logged and swallowed; the portal will expire those sessions on
    /// its own.
    pub async fn logout_all(&self) {
        let drained: Vec<(SessionKey, Slot)> = {
            let mut slots = self.slots.lock().expect("session cache lock poisoned");
            slots.drain().collect()
        };
        for (key, slot) in drained {
            let mut guard = slot.lock().await;
            if let Some((adapter, session)) = guard.take() {
                match adapter.logout(&session).await {
                    Ok(()) => debug!(institution = %key.institution_id, "logged out"),
                    Err(err) => warn!(
                        institution = %key.institution_id,
                        error = %err,
                        "logout failed, leaving session to expire server-side"
                    ),
                }
            }
        }
    }
}
