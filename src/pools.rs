// src/pools.rs

use ethers::prelude::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Lifecycle status of a launchpool.
///
/// The configured status is the *nominal* one. The effective status of an
/// `Active` pool is re-derived every round from the on-chain `periodFinish`
/// (see `subscription::dispatcher::derive_pool_status`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolStatus {
    Active,
    Soon,
    Closed,
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PoolStatus::Active => "active",
            PoolStatus::Soon => "soon",
            PoolStatus::Closed => "closed",
        };
        f.write_str(s)
    }
}

fn default_reward_abi() -> String {
    crate::contracts::LAUNCHPOOL_ABI_NAME.to_string()
}

fn default_decimals() -> u32 {
    18
}

/// Static description of one launchpool, loaded once from configuration.
///
/// Pairs a depositable token contract with the reward ("earn") contract that
/// holds stakes and accrues rewards. Never mutated after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolDescriptor {
    pub id: String,
    pub name: String,
    /// Symbol of the staked token
    #[serde(default)]
    pub token: String,
    pub token_address: Address,
    #[serde(default = "default_decimals")]
    pub token_decimals: u32,
    /// Symbol of the reward token
    #[serde(default)]
    pub earned_token: String,
    pub earn_contract_address: Address,
    /// Name of the reward contract ABI in the `AbiRegistry`
    #[serde(default = "default_reward_abi")]
    pub earn_contract_abi: String,
    #[serde(default = "default_decimals")]
    pub earned_token_decimals: u32,
    pub status: PoolStatus,
    /// Unix seconds; absent when not known up front
    #[serde(default)]
    pub period_finish: Option<u64>,
    #[serde(default)]
    pub hide_countdown: bool,
    #[serde(default)]
    pub partnership: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PoolConfigError {
    #[error("Duplicate pool id: {0}")]
    DuplicatePool(String),
    #[error("Pool id must not be empty")]
    EmptyId,
}

/// Ordered, id-indexed collection of pool descriptors for one network.
#[derive(Debug, Clone, Default)]
pub struct PoolCatalog {
    pools: Vec<PoolDescriptor>,
    by_id: HashMap<String, usize>,
}

impl PoolCatalog {
    pub fn new(pools: Vec<PoolDescriptor>) -> Result<Self, PoolConfigError> {
        let mut by_id = HashMap::with_capacity(pools.len());
        for (index, pool) in pools.iter().enumerate() {
            if pool.id.trim().is_empty() {
                return Err(PoolConfigError::EmptyId);
            }
            if by_id.insert(pool.id.clone(), index).is_some() {
                return Err(PoolConfigError::DuplicatePool(pool.id.clone()));
            }
        }
        Ok(Self { pools, by_id })
    }

    pub fn get(&self, id: &str) -> Option<&PoolDescriptor> {
        self.by_id.get(id).map(|&index| &self.pools[index])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Pools in configuration order
    pub fn iter(&self) -> impl Iterator<Item = &PoolDescriptor> {
        self.pools.iter()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}
