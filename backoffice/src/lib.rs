//! Start-up wiring and request entry points of the back office.
//!
//! [`BackOffice`] owns the three shared pieces built at start-up:
//!
//! - the authorization engine, behind an `Arc`
//! - the album listing cache
//! - the membership reconciler over the principal directory
//!
//! Every request method takes a [`CancelSignal`]. Cancellation surfaces as
//! [`Decision::Cancelled`] from [`BackOffice::authorize`] and as
//! [`BackOfficeError::Cancelled`] (or a wrapped `Cancelled`) elsewhere.

pub mod config;
pub mod error;
pub mod logging;
pub mod policies;

pub use config::{BackOfficeConfig, CacheSettings, DirectorySettings, CONFIG_ENV};
pub use error::{BackOfficeError, Result};

use authz::{AuthzEngine, Decision};
use cancellation::CancelSignal;
use json_cache::{AlbumRecord, CacheBackend, CatalogCache, CatalogSource, RedbCache};
use membership::{DirectoryConfig, MembershipReconciler, PrincipalDirectory, SqliteDirectory};
use std::sync::Arc;
use tracing::{debug, info};

pub struct BackOffice {
    engine: Arc<AuthzEngine>,
    directory: Arc<dyn PrincipalDirectory>,
    catalog: CatalogCache<dyn CacheBackend>,
    reconciler: MembershipReconciler<dyn PrincipalDirectory>,
    claim_types: Vec<String>,
}

impl BackOffice {
    /// Assemble the back office from a validated configuration and the two
    /// external stores.
    pub fn new(
        config: &BackOfficeConfig,
        directory: Arc<dyn PrincipalDirectory>,
        cache: Arc<dyn CacheBackend>,
    ) -> Result<Self> {
        let engine = Arc::new(policies::build_engine(config)?);
        let catalog = CatalogCache::from_backend(cache, config.cache.catalog_ttl());
        let reconciler = MembershipReconciler::new(Arc::clone(&directory));

        info!(
            "Back office ready: {} policies, {} assignable claim types",
            engine.policies().len(),
            config.claim_types.len()
        );

        Ok(Self {
            engine,
            directory,
            catalog,
            reconciler,
            claim_types: config.claim_types.clone(),
        })
    }

    /// Open the redb cache and SQLite directory named in the configuration.
    pub async fn open(config: &BackOfficeConfig) -> Result<Self> {
        let cache = RedbCache::open(&config.cache.path)?;
        let directory = SqliteDirectory::connect(&DirectoryConfig::from(&config.directory)).await?;
        Self::new(config, Arc::new(directory), Arc::new(cache))
    }

    pub fn engine(&self) -> &Arc<AuthzEngine> {
        &self.engine
    }

    pub fn directory(&self) -> &Arc<dyn PrincipalDirectory> {
        &self.directory
    }

    pub fn reconciler(&self) -> &MembershipReconciler<dyn PrincipalDirectory> {
        &self.reconciler
    }

    pub fn claim_types(&self) -> &[String] {
        &self.claim_types
    }

    /// Decide whether `principal_id` may perform an action guarded by
    /// `policy_name`.
    ///
    /// The principal is read from the directory exactly once; the whole
    /// policy is judged against that snapshot.
    pub async fn authorize(
        &self,
        principal_id: &str,
        policy_name: &str,
        cancel: &CancelSignal,
    ) -> Result<Decision> {
        if self.engine.policies().get(policy_name).is_none() {
            return Err(authz::AuthzError::UnknownPolicy(policy_name.to_string()).into());
        }

        let principal = match cancel.run(self.directory.find_principal(principal_id)).await {
            Ok(found) => found?
                .ok_or_else(|| BackOfficeError::PrincipalNotFound(principal_id.to_string()))?,
            Err(_) => {
                debug!("Authorization of {} cancelled during lookup", principal_id);
                return Ok(Decision::Cancelled);
            }
        };

        Ok(self.engine.evaluate(&principal, policy_name, cancel)?)
    }

    /// Today's album listing, served from cache when fresh.
    pub async fn albums_of_today(
        &self,
        source: &dyn CatalogSource,
        cancel: &CancelSignal,
    ) -> Result<Vec<AlbumRecord>> {
        Ok(self.catalog.listing(source, cancel).await?)
    }

    /// Called by catalog writers after any album change.
    pub async fn invalidate_albums(&self, cancel: &CancelSignal) -> Result<()> {
        Ok(self.catalog.invalidate(cancel).await?)
    }

    /// Assignable claim types the principal does not hold yet.
    pub async fn available_claims(
        &self,
        principal_id: &str,
        cancel: &CancelSignal,
    ) -> Result<Vec<String>> {
        Ok(self
            .reconciler
            .available_claims(principal_id, &self.claim_types, cancel)
            .await?)
    }
}
