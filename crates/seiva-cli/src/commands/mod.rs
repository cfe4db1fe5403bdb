pub mod config_check;
pub mod document;
pub mod scrape;
pub mod versions;

use std::sync::Arc;
use std::time::Duration;

use seiva_adapters::{AdapterRegistry, http};
use seiva_config::SeivaConfig;
use seiva_session::{EnvCredentials, SessionManager, SessionOptions};

pub(crate) fn build_registry(config: &SeivaConfig) -> AdapterRegistry {
    AdapterRegistry::new(http::build_client(
        Duration::from_secs(config.http.timeout_secs),
        &config.http.user_agent,
    ))
}

pub(crate) fn session_manager(config: &SeivaConfig) -> Arc<SessionManager> {
    Arc::new(SessionManager::new(
        Arc::new(EnvCredentials),
        SessionOptions {
            ttl_minutes: config.session.ttl_minutes,
            expiry_buffer_secs: config.session.expiry_buffer_secs,
        },
    ))
}
