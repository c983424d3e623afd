// src/state.rs
//
// Application state fed by subscription rounds and transaction handlers.

use crate::pools::{PoolCatalog, PoolStatus};
use crate::subscription::dispatcher::Dispatch;
use async_trait::async_trait;
use ethers::prelude::U256;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::trace;

/// User transaction kinds that carry an in-flight flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StakeAction {
    Approval,
    Stake,
    Withdraw,
    Claim,
    Exit,
}

impl fmt::Display for StakeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StakeAction::Approval => "approval",
            StakeAction::Stake => "stake",
            StakeAction::Withdraw => "withdraw",
            StakeAction::Claim => "claim",
            StakeAction::Exit => "exit",
        };
        f.write_str(s)
    }
}

/// Raw inputs of the APY computation (see `format::pool_apy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ApyInputs {
    pub reward_rate: U256,
    pub total_staked: U256,
    pub price_per_share: U256,
}

/// Field update emitted by the dispatcher or a transaction handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StateUpdate {
    UserApproval { pool_id: String, allowance: U256 },
    UserBalance { pool_id: String, balance: U256 },
    UserStaked { pool_id: String, staked: U256 },
    UserRewardsAvailable { pool_id: String, rewards: U256 },
    PoolApy { pool_id: String, inputs: ApyInputs },
    PoolStaked { pool_id: String, total_staked: U256 },
    PoolTvl { pool_id: String, total_staked: U256 },
    PoolFinish {
        pool_id: String,
        finish: U256,
        status: PoolStatus,
    },
    TransactionPending {
        pool_id: String,
        action: StakeAction,
        pending: bool,
    },
}

impl StateUpdate {
    pub fn pool_id(&self) -> &str {
        match self {
            StateUpdate::UserApproval { pool_id, .. }
            | StateUpdate::UserBalance { pool_id, .. }
            | StateUpdate::UserStaked { pool_id, .. }
            | StateUpdate::UserRewardsAvailable { pool_id, .. }
            | StateUpdate::PoolApy { pool_id, .. }
            | StateUpdate::PoolStaked { pool_id, .. }
            | StateUpdate::PoolTvl { pool_id, .. }
            | StateUpdate::PoolFinish { pool_id, .. }
            | StateUpdate::TransactionPending { pool_id, .. } => pool_id,
        }
    }
}

/// In-flight flags of one pool's user transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PendingFlags {
    pub approval: bool,
    pub stake: bool,
    pub withdraw: bool,
    pub claim: bool,
    pub exit: bool,
}

impl PendingFlags {
    pub fn get(&self, action: StakeAction) -> bool {
        match action {
            StakeAction::Approval => self.approval,
            StakeAction::Stake => self.stake,
            StakeAction::Withdraw => self.withdraw,
            StakeAction::Claim => self.claim,
            StakeAction::Exit => self.exit,
        }
    }

    pub fn set(&mut self, action: StakeAction, pending: bool) {
        let flag = match action {
            StakeAction::Approval => &mut self.approval,
            StakeAction::Stake => &mut self.stake,
            StakeAction::Withdraw => &mut self.withdraw,
            StakeAction::Claim => &mut self.claim,
            StakeAction::Exit => &mut self.exit,
        };
        *flag = pending;
    }
}

/// Latest known values for one pool. Amounts are raw integers in the
/// token's smallest unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolState {
    pub user_approval: U256,
    pub user_balance: U256,
    pub user_staked: U256,
    pub user_rewards_available: U256,
    pub pool_staked: U256,
    pub pool_tvl: U256,
    pub pool_apy: Option<ApyInputs>,
    /// Unix seconds; `None` until known
    pub pool_finish: Option<U256>,
    pub pool_status: PoolStatus,
    pub pending: PendingFlags,
}

impl PoolState {
    fn initial(status: PoolStatus, period_finish: Option<u64>) -> Self {
        Self {
            user_approval: U256::zero(),
            user_balance: U256::zero(),
            user_staked: U256::zero(),
            user_rewards_available: U256::zero(),
            pool_staked: U256::zero(),
            pool_tvl: U256::zero(),
            pool_apy: None,
            pool_finish: period_finish.map(U256::from),
            pool_status: status,
            pending: PendingFlags::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StakeState {
    pub pools: BTreeMap<String, PoolState>,
}

impl StakeState {
    pub fn new(catalog: &PoolCatalog) -> Self {
        let pools = catalog
            .iter()
            .map(|pool| {
                (
                    pool.id.clone(),
                    PoolState::initial(pool.status, pool.period_finish),
                )
            })
            .collect();
        Self { pools }
    }

    pub fn pool(&self, pool_id: &str) -> Option<&PoolState> {
        self.pools.get(pool_id)
    }

    /// Applies one update. Updates for pools not in the state are rejected.
    pub fn apply(&mut self, update: &StateUpdate) -> Result<(), StateError> {
        let pool = self
            .pools
            .get_mut(update.pool_id())
            .ok_or_else(|| StateError::UnknownPool(update.pool_id().to_string()))?;

        match update {
            StateUpdate::UserApproval { allowance, .. } => pool.user_approval = *allowance,
            StateUpdate::UserBalance { balance, .. } => pool.user_balance = *balance,
            StateUpdate::UserStaked { staked, .. } => pool.user_staked = *staked,
            StateUpdate::UserRewardsAvailable { rewards, .. } => {
                pool.user_rewards_available = *rewards
            }
            StateUpdate::PoolApy { inputs, .. } => pool.pool_apy = Some(*inputs),
            StateUpdate::PoolStaked { total_staked, .. } => pool.pool_staked = *total_staked,
            StateUpdate::PoolTvl { total_staked, .. } => pool.pool_tvl = *total_staked,
            StateUpdate::PoolFinish { finish, status, .. } => {
                pool.pool_finish = Some(*finish);
                pool.pool_status = *status;
            }
            StateUpdate::TransactionPending {
                action, pending, ..
            } => pool.pending.set(*action, *pending),
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Unknown pool: {0}")]
    UnknownPool(String),
}

/// Shared owner of `StakeState`.
///
/// Every applied update is re-broadcast so views can re-render.
pub struct StakeStore {
    state: RwLock<StakeState>,
    updates: broadcast::Sender<StateUpdate>,
}

impl StakeStore {
    pub fn new(catalog: &PoolCatalog) -> Self {
        let (updates, _) = broadcast::channel(256);
        Self {
            state: RwLock::new(StakeState::new(catalog)),
            updates,
        }
    }

    pub fn apply(&self, update: StateUpdate) -> Result<(), StateError> {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(&update)?;
        trace!(pool_id = update.pool_id(), "state updated");
        // No receivers is fine
        let _ = self.updates.send(update);
        Ok(())
    }

    pub fn snapshot(&self) -> StakeState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn pool(&self, pool_id: &str) -> Option<PoolState> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .pool(pool_id)
            .cloned()
    }

    pub fn subscribe_updates(&self) -> broadcast::Receiver<StateUpdate> {
        self.updates.subscribe()
    }
}

#[async_trait]
impl Dispatch for StakeStore {
    async fn dispatch(&self, update: StateUpdate) -> anyhow::Result<()> {
        self.apply(update)?;
        Ok(())
    }
}
