//! Session lifecycle configuration.

use serde::{Deserialize, Serialize};

/// Conservative TTL: most SEI deployments expire idle sessions at 30
/// minutes, so assume less.
const fn default_ttl_minutes() -> i64 {
    25
}

/// Re-authenticate rather than reuse a session this close to expiry.
const fn default_expiry_buffer_secs() -> i64 {
    60
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Estimated session lifetime in minutes.
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: i64,

    /// Seconds before estimated expiry at which a session stops being reused.
    #[serde(default = "default_expiry_buffer_secs")]
    pub expiry_buffer_secs: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_ttl_minutes(),
            expiry_buffer_secs: default_expiry_buffer_secs(),
        }
    }
}
