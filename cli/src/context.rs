use anyhow::{anyhow, Context as _, Result};
use authz::Role;
use backoffice::{BackOffice, BackOfficeConfig};
use cancellation::{cancel_pair, CancelSignal};
use json_cache::RedbCache;
use membership::{DirectoryConfig, PrincipalDirectory, SqliteDirectory};
use std::path::Path;
use std::sync::Arc;

/// Everything a command needs, opened once per invocation.
pub struct Context {
    pub config: BackOfficeConfig,
    pub office: BackOffice,
    pub directory: Arc<SqliteDirectory>,
    pub cache: Arc<RedbCache>,
}

/// Read the configuration from `config_path`, or from the environment.
pub fn load_config(config_path: Option<&Path>) -> Result<BackOfficeConfig> {
    let config = match config_path {
        Some(path) => BackOfficeConfig::from_file(path)?,
        None => BackOfficeConfig::from_env()?,
    };
    Ok(config)
}

impl Context {
    pub async fn open(config: BackOfficeConfig) -> Result<Self> {
        let cache = Arc::new(
            RedbCache::open(&config.cache.path)
                .with_context(|| format!("opening cache at {}", config.cache.path.display()))?,
        );
        let directory = Arc::new(
            SqliteDirectory::connect(&DirectoryConfig::from(&config.directory))
                .await
                .with_context(|| {
                    format!(
                        "opening directory at {}",
                        config.directory.database_path.display()
                    )
                })?,
        );

        let office = BackOffice::new(&config, directory.clone(), cache.clone())?;

        Ok(Self {
            config,
            office,
            directory,
            cache,
        })
    }

    /// A signal that fires on Ctrl-C.
    pub fn cancel_on_ctrl_c(&self) -> CancelSignal {
        let (handle, signal) = cancel_pair();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                handle.cancel();
            }
        });
        signal
    }

    /// Look a role up by name first, then by id.
    pub async fn resolve_role(&self, key: &str, cancel: &CancelSignal) -> Result<Role> {
        if let Some(role) = cancel.run(self.directory.find_role_by_name(key)).await?? {
            return Ok(role);
        }
        cancel
            .run(self.directory.find_role(key))
            .await??
            .ok_or_else(|| anyhow!("Role not found: {}", key))
    }

    pub async fn close(&self) {
        SqliteDirectory::clone(&self.directory).close().await;
    }
}
