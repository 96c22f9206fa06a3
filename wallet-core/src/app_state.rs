use std::fs;
use std::path::{Path, PathBuf};

use crate::config_store::{ConfigStore, WalletConfig};
use crate::errors::{WalletError, WalletResult};

pub const ENVIRONMENT_VAR: &str = "LINDA_WALLET_ENV";

/// Configuration root of one wallet client installation.
#[derive(Debug)]
pub struct WalletContext {
    root_dir: PathBuf,
    config_store: ConfigStore,
    config: WalletConfig,
    environment: String,
}

impl WalletContext {
    pub fn initialize(root_dir: PathBuf) -> WalletResult<Self> {
        let environment =
            std::env::var(ENVIRONMENT_VAR).unwrap_or_else(|_| "development".to_string());
        Self::with_environment(root_dir, environment)
    }

    pub fn with_environment(root_dir: PathBuf, environment: String) -> WalletResult<Self> {
        fs::create_dir_all(&root_dir).map_err(|e| {
            WalletError::StorageError(format!(
                "Cannot create config directory {}: {}",
                root_dir.display(),
                e
            ))
        })?;

        let config_store = ConfigStore::in_dir(&root_dir);
        let config = config_store.load_or_default(environment.clone())?;

        Ok(Self {
            root_dir,
            config_store,
            config,
            environment,
        })
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.config_store
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn update_config<F>(&mut self, updater: F) -> WalletResult<&WalletConfig>
    where
        F: FnOnce(&mut WalletConfig) -> WalletResult<()>,
    {
        self.config = self
            .config_store
            .update(self.environment.clone(), updater)?;
        Ok(&self.config)
    }
}
