// Contracts Module - read-only ABIs used by launchpool subscriptions

use ethers::abi::{parse_abi, Abi};
use ethers::contract::BaseContract;
use std::collections::HashMap;
use std::path::Path;

/// Registry name of the standard launchpool reward contract ABI
pub const LAUNCHPOOL_ABI_NAME: &str = "launchpool";

/// Vault share token ("moo" token) that users deposit into a launchpool.
pub const MOO_TOKEN_ABI: &[&str] = &[
    "function allowance(address owner, address spender) external view returns (uint256)",
    "function balanceOf(address account) external view returns (uint256)",
    "function getPricePerFullShare() external view returns (uint256)",
    "function decimals() external view returns (uint8)",
];

/// Synthetix-style staking rewards contract.
pub const LAUNCHPOOL_REWARD_ABI: &[&str] = &[
    "function balanceOf(address account) external view returns (uint256)",
    "function earned(address account) external view returns (uint256)",
    "function rewardRate() external view returns (uint256)",
    "function totalSupply() external view returns (uint256)",
    "function periodFinish() external view returns (uint256)",
];

#[derive(Debug, thiserror::Error)]
pub enum AbiRegistryError {
    #[error("Failed to parse ABI {name}: {reason}")]
    Parse { name: String, reason: String },
    #[error("Failed to read ABI file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Named reward-contract ABIs plus the fixed token ABI.
///
/// Pools reference their reward ABI by name (`PoolDescriptor::earn_contract_abi`);
/// the token side always uses `MOO_TOKEN_ABI`.
#[derive(Debug, Clone)]
pub struct AbiRegistry {
    token: BaseContract,
    rewards: HashMap<String, BaseContract>,
}

impl AbiRegistry {
    /// Registry with the built-in token and `launchpool` reward ABIs.
    pub fn with_standard() -> Result<Self, AbiRegistryError> {
        let token = parse_human_readable("token", MOO_TOKEN_ABI)?;
        let reward = parse_human_readable(LAUNCHPOOL_ABI_NAME, LAUNCHPOOL_REWARD_ABI)?;

        let mut rewards = HashMap::new();
        rewards.insert(LAUNCHPOOL_ABI_NAME.to_string(), BaseContract::from(reward));

        Ok(Self {
            token: BaseContract::from(token),
            rewards,
        })
    }

    pub fn insert(&mut self, name: impl Into<String>, abi: Abi) {
        self.rewards.insert(name.into(), BaseContract::from(abi));
    }

    /// Loads a JSON ABI (solc / hardhat artifact `abi` array) under `name`.
    pub fn load_json_file(
        &mut self,
        name: &str,
        path: impl AsRef<Path>,
    ) -> Result<(), AbiRegistryError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| AbiRegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let abi: Abi = serde_json::from_str(&raw).map_err(|e| AbiRegistryError::Parse {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        self.insert(name, abi);
        Ok(())
    }

    pub fn token(&self) -> &BaseContract {
        &self.token
    }

    pub fn reward(&self, name: &str) -> Option<&BaseContract> {
        self.rewards.get(name)
    }

    pub fn contains_reward(&self, name: &str) -> bool {
        self.rewards.contains_key(name)
    }
}

fn parse_human_readable(name: &str, signatures: &[&str]) -> Result<Abi, AbiRegistryError> {
    parse_abi(signatures).map_err(|e| AbiRegistryError::Parse {
        name: name.to_string(),
        reason: e.to_string(),
    })
}
