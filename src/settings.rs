use crate::contracts::{AbiRegistry, AbiRegistryError, LAUNCHPOOL_ABI_NAME};
use crate::pools::{PoolCatalog, PoolConfigError, PoolDescriptor};
use crate::subscription::SchedulerConfig;
use config::{Config, ConfigError, File, FileFormat};
use ethers::prelude::Address;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

/// One chain the front end can run against.
#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    pub rpc_url: String,
    /// Multicall3 deployment
    pub multicall_address: Address,
    /// Launchpools in display order
    #[serde(default)]
    pub pools: Vec<PoolDescriptor>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerSettings {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_min_update_delay_ms")]
    pub min_update_delay_ms: u64,
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
}

fn default_debounce_ms() -> u64 {
    100
}
fn default_min_update_delay_ms() -> u64 {
    10_000 // min time between rounds
}
fn default_update_interval_ms() -> u64 {
    30_000
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            min_update_delay_ms: default_min_update_delay_ms(),
            update_interval_ms: default_update_interval_ms(),
        }
    }
}

impl SchedulerSettings {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            min_update_delay: Duration::from_millis(self.min_update_delay_ms),
        }
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MulticallSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_batch_size() -> usize {
    200
}
fn default_timeout_seconds() -> u64 {
    10
}

impl Default for MulticallSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Network {0} is not configured")]
    UnknownNetwork(String),
    #[error("Invalid RPC url {url}: {reason}")]
    InvalidRpcUrl { url: String, reason: String },
    #[error(transparent)]
    Pools(#[from] PoolConfigError),
    #[error("Pool {pool_id} references unknown ABI {abi}")]
    UnknownAbi { pool_id: String, abi: String },
    #[error(transparent)]
    Abi(#[from] AbiRegistryError),
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Key of the active entry in `networks`
    pub network: String,
    pub networks: HashMap<String, NetworkConfig>,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub multicall: MulticallSettings,
    /// Extra reward ABIs: name -> JSON ABI file
    #[serde(default)]
    pub abis: HashMap<String, String>,
}

impl Settings {
    /// Loads `Config.toml` (or `$LAUNCHPOOL_CONFIG`) and applies env overrides.
    pub fn new() -> Result<Self, SettingsError> {
        let path = env::var("LAUNCHPOOL_CONFIG").unwrap_or_else(|_| "Config.toml".to_string());
        Self::from_path(&path)
    }

    pub fn from_path(path: &str) -> Result<Self, SettingsError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        Self::finish(s.try_deserialize()?)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, SettingsError> {
        let s = Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()?;
        Self::finish(s.try_deserialize()?)
    }

    fn finish(mut settings: Self) -> Result<Self, SettingsError> {
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(network) = env::var("LAUNCHPOOL_NETWORK") {
            let trimmed = network.trim();
            if !trimmed.is_empty() {
                self.network = trimmed.to_lowercase();
            }
        }

        if let Ok(rpc_url) = env::var("LAUNCHPOOL_RPC_URL") {
            let trimmed = rpc_url.trim();
            if !trimmed.is_empty() {
                if let Some(network) = self.networks.get_mut(&self.network) {
                    network.rpc_url = trimmed.to_string();
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let network = self.active_network()?;

        url::Url::parse(&network.rpc_url).map_err(|e| SettingsError::InvalidRpcUrl {
            url: network.rpc_url.clone(),
            reason: e.to_string(),
        })?;

        let catalog = self.pool_catalog()?;
        for pool in catalog.iter() {
            let abi = &pool.earn_contract_abi;
            if abi != LAUNCHPOOL_ABI_NAME && !self.abis.contains_key(abi) {
                return Err(SettingsError::UnknownAbi {
                    pool_id: pool.id.clone(),
                    abi: abi.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn active_network(&self) -> Result<&NetworkConfig, SettingsError> {
        self.networks
            .get(&self.network)
            .ok_or_else(|| SettingsError::UnknownNetwork(self.network.clone()))
    }

    /// Pools of the active network. ABI names are matched case-insensitively,
    /// since configuration keys are lowercased on load.
    pub fn pool_catalog(&self) -> Result<PoolCatalog, SettingsError> {
        let pools = self
            .active_network()?
            .pools
            .iter()
            .cloned()
            .map(|mut pool| {
                pool.earn_contract_abi = pool.earn_contract_abi.to_lowercase();
                pool
            })
            .collect();
        Ok(PoolCatalog::new(pools)?)
    }

    pub fn abi_registry(&self) -> Result<AbiRegistry, SettingsError> {
        let mut registry = AbiRegistry::with_standard()?;
        for (name, path) in &self.abis {
            registry.load_json_file(&name.to_lowercase(), path)?;
        }
        Ok(registry)
    }
}
