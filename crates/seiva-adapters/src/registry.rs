//! Adapter registry: configured version → concrete adapter.
//!
//! Adapters are constructed once, up front, and shared behind `Arc`; resolve
//! is a pure map lookup with no network I/O, so an unsupported version fails
//! at job submission rather than mid-scrape.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use seiva_core::{ScrapeError, SeiVersion, VersionFamily};

use crate::v2::V2Adapter;
use crate::v4::V4Adapter;
use crate::v5::V5Adapter;
use crate::{AdapterResolver, VersionAdapter, http};

/// The supported (family, minor) pairs and their adapters.
pub struct AdapterRegistry {
    adapters: HashMap<SeiVersion, Arc<dyn VersionAdapter>>,
}

impl AdapterRegistry {
    /// Build the registry over a shared HTTP client.
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        let mut adapters: HashMap<SeiVersion, Arc<dyn VersionAdapter>> = HashMap::new();

        let entries: Vec<Arc<dyn VersionAdapter>> = vec![
            Arc::new(V2Adapter::v2_5(client.clone())),
            Arc::new(V2Adapter::v2_6(client.clone())),
            Arc::new(V4Adapter::v4_0(client.clone())),
            Arc::new(V4Adapter::v4_1(client.clone())),
            Arc::new(V4Adapter::v4_2(client.clone())),
            Arc::new(V5Adapter::v5_0(client)),
        ];
        for adapter in entries {
            adapters.insert(adapter.version(), adapter);
        }

        Self { adapters }
    }

    /// Registry over a client with default timeout and user agent.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(http::build_client(Duration::from_secs(30), "seiva/0.1"))
    }

    /// Every supported version, ordered by (major, minor).
    #[must_use]
    pub fn supported_versions(&self) -> Vec<SeiVersion> {
        let mut versions: Vec<SeiVersion> = self.adapters.keys().copied().collect();
        versions.sort_by_key(|v| (v.family.major(), v.minor));
        versions
    }

    /// Whether a (family, minor) pair has an adapter.
    #[must_use]
    pub fn supports(&self, version: &SeiVersion) -> bool {
        self.adapters.contains_key(version)
    }
}

impl AdapterResolver for AdapterRegistry {
    fn resolve(&self, version: &SeiVersion) -> Result<Arc<dyn VersionAdapter>, ScrapeError> {
        self.adapters
            .get(version)
            .cloned()
            .ok_or(ScrapeError::UnsupportedVersion {
                family: version.family,
                minor: version.minor,
            })
    }
}

/// Supported minors per family, for error messages and the CLI.
#[must_use]
pub fn supported_minors(family: VersionFamily) -> &'static [u8] {
    match family {
        VersionFamily::V2 => &[5, 6],
        VersionFamily::V4 => &[0, 1, 2],
        VersionFamily::V5 => &[0],
    }
}
