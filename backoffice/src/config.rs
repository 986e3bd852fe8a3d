//! Start-up configuration, loaded once from YAML.
//!
//! ```yaml
//! policies:
//!   EditAlbums:
//!     - type: claim
//!       claim_type: Edit Albums
//! claim_types: [Edit Albums, Add Albums, Delete Albums]
//! cache:
//!   path: data/backoffice/cache.redb
//!   catalog_ttl_seconds: 300
//! directory:
//!   database_path: data/backoffice/directory.db
//! log_dir: data/logs
//! ```

use crate::error::{BackOfficeError, Result};
use crate::policies::{
    ADMINISTRATORS, EDIT_ALBUMS, HAS_EDIT_ALBUMS_CLAIM, QUALIFIED_USER,
};
use authz::{AuthzError, Requirement};
use membership::DirectoryConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "BACKOFFICE_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub path: PathBuf,
    /// Freshness window of the album listing; absent means never stale
    pub catalog_ttl_seconds: Option<u64>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/backoffice/cache.redb"),
            catalog_ttl_seconds: Some(300),
        }
    }
}

impl CacheSettings {
    pub fn catalog_ttl(&self) -> Option<Duration> {
        self.catalog_ttl_seconds.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorySettings {
    pub database_path: PathBuf,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        let defaults = DirectoryConfig::default();
        Self {
            database_path: defaults.database_path,
            max_connections: defaults.max_connections,
            connection_timeout: defaults.connection_timeout,
        }
    }
}

impl From<&DirectorySettings> for DirectoryConfig {
    fn from(settings: &DirectorySettings) -> Self {
        DirectoryConfig {
            database_path: settings.database_path.clone(),
            max_connections: settings.max_connections,
            connection_timeout: settings.connection_timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackOfficeConfig {
    /// Policy name to ordered requirement list
    pub policies: BTreeMap<String, Vec<Requirement>>,
    /// Claim types an administrator may assign
    pub claim_types: Vec<String>,
    pub cache: CacheSettings,
    pub directory: DirectorySettings,
    pub log_dir: PathBuf,
}

impl Default for BackOfficeConfig {
    fn default() -> Self {
        let mut policies = BTreeMap::new();
        policies.insert(
            "AdministratorsOnly".to_string(),
            vec![Requirement::role(ADMINISTRATORS)],
        );
        policies.insert("EditAlbums".to_string(), vec![Requirement::claim(EDIT_ALBUMS)]);
        policies.insert(
            "EditAlbumsAssertion".to_string(),
            vec![Requirement::assertion(HAS_EDIT_ALBUMS_CLAIM)],
        );
        policies.insert(
            "QualifiedEditor".to_string(),
            vec![Requirement::assertion(QUALIFIED_USER)],
        );

        Self {
            policies,
            claim_types: vec![
                EDIT_ALBUMS.to_string(),
                "Add Albums".to_string(),
                "Delete Albums".to_string(),
            ],
            cache: CacheSettings::default(),
            directory: DirectorySettings::default(),
            log_dir: PathBuf::from("data/logs"),
        }
    }
}

impl BackOfficeConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from file path
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BackOfficeError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml(&content)?;
        info!(
            "Loaded back-office configuration from {} ({} policies)",
            path.display(),
            config.policies.len()
        );
        Ok(config)
    }

    /// Load the file named by `BACKOFFICE_CONFIG` (after reading `.env`),
    /// or fall back to the built-in defaults.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(path),
            Err(_) => {
                info!("{} not set, using default configuration", CONFIG_ENV);
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some((name, _)) = self.policies.iter().find(|(_, reqs)| reqs.is_empty()) {
            return Err(AuthzError::EmptyPolicy(name.clone()).into());
        }
        if self.cache.catalog_ttl_seconds == Some(0) {
            return Err(BackOfficeError::Config(
                "cache.catalog_ttl_seconds must be positive".to_string(),
            ));
        }
        if self.claim_types.iter().any(|t| t.trim().is_empty()) {
            return Err(BackOfficeError::Config(
                "claim_types must not contain blank entries".to_string(),
            ));
        }
        Ok(())
    }
}
