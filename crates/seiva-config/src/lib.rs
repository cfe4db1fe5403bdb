//! # seiva-config
//!
//! Layered configuration loading for Seiva using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`SEIVA_*` prefix, `__` as separator)
//! 2. Project-level `.seiva/config.toml`
//! 3. User-level `~/.config/seiva/config.toml`
//! 4. Built-in defaults
//!
//! # Environment Variable Mapping
//!
//! Figment maps `SEIVA_HTTP__TIMEOUT_SECS` -> `http.timeout_secs`,
//! `SEIVA_ORCHESTRATOR__MAX_CONCURRENT_JOBS` -> `orchestrator.max_concurrent_jobs`,
//! etc. The `__` (double underscore) separates nested config sections.
//!
//! Institution passwords are never stored in config files: each
//! `[[institutions]]` entry names the environment variable holding its
//! password (`password_env`), resolved at authenticate time.

mod error;
mod http;
mod institution;
mod orchestrator;
mod session;

pub use error::ConfigError;
pub use http::HttpConfig;
pub use institution::InstitutionEntry;
pub use orchestrator::OrchestratorConfig;
pub use session::SessionConfig;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use seiva_core::InstitutionConfig;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SeivaConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub institutions: Vec<InstitutionEntry>,
}

impl SeivaConfig {
    /// Load configuration from all sources (TOML files + environment variables).
    ///
    /// Does NOT call `dotenvy` -- use [`Self::load_with_dotenv`] if you need
    /// `.env` file loading.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when extraction fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::figment().extract().map_err(ConfigError::from)
    }

    /// Load configuration with `.env` file support.
    ///
    /// Calls `dotenvy` to load the `.env` file from the workspace root before
    /// building the figment. This is the typical entry point for the CLI.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when extraction fails.
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        Self::load_dotenv_from_workspace();
        Self::load()
    }

    /// Build the figment provider chain.
    ///
    /// Public so tests can inspect the figment directly or add additional
    /// providers on top.
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        let local_path = PathBuf::from(".seiva/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        figment.merge(Env::prefixed("SEIVA_").split("__"))
    }

    /// Validate and convert every institution entry.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError::InvalidValue`] encountered (bad
    /// version string, duplicate id, empty base URL).
    pub fn institution_configs(&self) -> Result<Vec<InstitutionConfig>, ConfigError> {
        let mut seen = std::collections::HashSet::new();
        let mut configs = Vec::with_capacity(self.institutions.len());
        for entry in &self.institutions {
            if !seen.insert(entry.id.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: format!("institutions.{}", entry.id),
                    reason: "duplicate institution id".into(),
                });
            }
            configs.push(entry.to_config()?);
        }
        Ok(configs)
    }

    /// Path to the user-global config file.
    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("seiva").join("config.toml"))
    }

    /// Load `.env` from the workspace root.
    ///
    /// Walks up from `CARGO_MANIFEST_DIR` (if available) or current dir
    /// looking for a `.env` file. Silently does nothing if no `.env` is found.
    fn load_dotenv_from_workspace() {
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let mut dir = PathBuf::from(manifest_dir);
            for _ in 0..3 {
                let env_path = dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                    return;
                }
                if !dir.pop() {
                    break;
                }
            }
        }

        let _ = dotenvy::dotenv();
    }
}
