//! Authenticated session state.
//!
//! A `Session` is opaque to everything except the adapter family that
//! created it and the session manager that owns its lifecycle. Adapters
//! treat it as a read-only token for the duration of one call. It is
//! deliberately not serializable, and its `Debug` output never exposes
//! cookie or token values.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;

/// Conservative default lifetime estimate adapters stamp on a fresh
/// session; the session manager replaces it with the configured TTL.
pub const DEFAULT_TTL_MINUTES: i64 = 25;

/// Cache key: exactly one live session is permitted per (institution,
/// account) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub institution_id: String,
    pub account: String,
}

/// One portal cookie. `Debug` redacts the value.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
}

impl fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=<redacted>", self.name)
    }
}

/// Opaque authentication state for one (institution, account) pair.
///
/// Created by a successful `authenticate`; mutated only by the session
/// manager; destroyed on explicit logout, detected expiry, or shutdown.
#[derive(Clone)]
pub struct Session {
    pub institution_id: String,
    /// Portal root of the deployment this session belongs to.
    pub base_url: String,
    pub account: String,
    /// Cookies collected during the login flow, replayed on every request.
    pub cookies: Vec<SessionCookie>,
    /// Family-specific hidden tokens (CSRF seeds, pagination seeds) the
    /// adapter extracted at login and needs on later requests.
    pub tokens: HashMap<String, String>,
    pub established_at: DateTime<Utc>,
    /// Conservative expiry estimate. Portals do not advertise exact expiry,
    /// so this is a time-based heuristic backed by reactive invalidation.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Cache key for this session.
    #[must_use]
    pub fn key(&self) -> SessionKey {
        SessionKey {
            institution_id: self.institution_id.clone(),
            account: self.account.clone(),
        }
    }

    /// Whether the session is past (or within `buffer` of) its estimated
    /// expiry and should be re-established rather than reused.
    #[must_use]
    pub fn is_expired(&self, buffer: Duration) -> bool {
        Utc::now() + buffer >= self.expires_at
    }

    /// Render the `Cookie` request header value.
    #[must_use]
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Look up a login-time token by name.
    #[must_use]
    pub fn token(&self, name: &str) -> Option<&str> {
        self.tokens.get(name).map(String::as_str)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("institution_id", &self.institution_id)
            .field("base_url", &self.base_url)
            .field("account", &self.account)
            .field(
                "cookies",
                &self.cookies.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            )
            .field("tokens", &self.tokens.keys().collect::<Vec<_>>())
            .field("established_at", &self.established_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(expires_in: Duration) -> Session {
        let now = Utc::now();
        Session {
            institution_id: "trf1".into(),
            base_url: "https://sei.trf1.jus.br".into(),
            account: "svc".into(),
            cookies: vec![SessionCookie {
                name: "PHPSESSID".into(),
                value: "abc123secret".into(),
            }],
            tokens: HashMap::from([("hdnToken".into(), "tok-9f2".into())]),
            established_at: now,
            expires_at: now + expires_in,
        }
    }

    #[test]
    fn debug_never_exposes_cookie_or_token_values() {
        let rendered = format!("{:?}", session(Duration::minutes(25)));
        assert!(rendered.contains("PHPSESSID"));
        assert!(!rendered.contains("abc123secret"));
        assert!(!rendered.contains("tok-9f2"));
    }

    #[test]
    fn cookie_header_joins_pairs() {
        let mut s = session(Duration::minutes(25));
        s.cookies.push(SessionCookie {
            name: "SEI_VERSAO".into(),
            value: "4".into(),
        });
        assert_eq!(s.cookie_header(), "PHPSESSID=abc123secret; SEI_VERSAO=4");
    }

    #[test]
    fn expiry_honors_buffer() {
        let s = session(Duration::seconds(30));
        assert!(!s.is_expired(Duration::seconds(0)));
        assert!(s.is_expired(Duration::seconds(60)));
    }
}
