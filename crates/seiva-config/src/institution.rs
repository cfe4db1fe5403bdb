//! Institution entries as written in config files.

use serde::{Deserialize, Serialize};

use seiva_core::{CredentialRef, InstitutionConfig, SeiVersion};

use crate::error::ConfigError;

/// One `[[institutions]]` entry. Converted to the canonical
/// [`InstitutionConfig`] after validation.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InstitutionEntry {
    /// Short stable identifier, keys batch outcomes.
    pub id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Portal root URL.
    pub base_url: String,
    /// Declared version as `"major.minor"` (e.g. `"4.2"`).
    pub version: String,
    /// Portal account name.
    pub account: String,
    /// Name of the environment variable holding the account password.
    pub password_env: String,
}

impl InstitutionEntry {
    /// Validate the entry and convert to the canonical config type.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for an unparseable version
    /// string or an empty base URL.
    pub fn to_config(&self) -> Result<InstitutionConfig, ConfigError> {
        let version: SeiVersion = self.version.parse().map_err(|reason| {
            ConfigError::InvalidValue {
                field: format!("institutions.{}.version", self.id),
                reason,
            }
        })?;
        if self.base_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("institutions.{}.base_url", self.id),
                reason: "base_url must not be empty".into(),
            });
        }
        Ok(InstitutionConfig {
            id: self.id.clone(),
            name: if self.name.is_empty() {
                self.id.clone()
            } else {
                self.name.clone()
            },
            base_url: self.base_url.trim_end_matches('/').to_string(),
            version,
            credentials: CredentialRef {
                account: self.account.clone(),
                secret_ref: self.password_env.clone(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use seiva_core::VersionFamily;

    fn entry() -> InstitutionEntry {
        InstitutionEntry {
            id: "trf1".into(),
            name: "Tribunal Regional Federal da 1ª Região".into(),
            base_url: "https://sei.trf1.jus.br/".into(),
            version: "4.2".into(),
            account: "scraper.svc".into(),
            password_env: "SEIVA_TRF1_PASSWORD".into(),
        }
    }

    #[test]
    fn converts_and_normalizes() {
        let config = entry().to_config().unwrap();
        assert_eq!(config.version.family, VersionFamily::V4);
        assert_eq!(config.version.minor, 2);
        // trailing slash stripped
        assert_eq!(config.base_url, "https://sei.trf1.jus.br");
        assert_eq!(config.credentials.account, "scraper.svc");
    }

    #[test]
    fn rejects_bad_version_string() {
        let mut e = entry();
        e.version = "four.two".into();
        let err = e.to_config().unwrap_err();
        assert!(err.to_string().contains("institutions.trf1.version"));
    }

    #[test]
    fn rejects_empty_base_url() {
        let mut e = entry();
        e.base_url = String::new();
        assert!(e.to_config().is_err());
    }

    #[test]
    fn name_falls_back_to_id() {
        let mut e = entry();
        e.name = String::new();
        assert_eq!(e.to_config().unwrap().name, "trf1");
    }
}
