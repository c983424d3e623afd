//! Batch aggregation: one multicall per round, results regrouped by pool.

use super::calls::{bind_contract, BoundCall};
use super::catalog::CallKind;
use super::demand::Demand;
use super::SubscriptionError;
use crate::contracts::AbiRegistry;
use crate::multicall::BatchExecutor;
use crate::pools::PoolCatalog;
use ethers::prelude::{Address, U256};
use std::collections::BTreeMap;
use tracing::debug;

/// Decoded call results of one pool, merged across contract groups.
pub type PoolResults = BTreeMap<CallKind, U256>;

/// Decoded call results of one round, keyed by pool id.
pub type RoundResults = BTreeMap<String, PoolResults>;

/// Binds every requested call of `demand` to its contract.
pub fn build_calls(
    pools: &PoolCatalog,
    abis: &AbiRegistry,
    demand: &Demand,
    user: Option<Address>,
) -> Result<Vec<BoundCall>, SubscriptionError> {
    let mut bound = Vec::with_capacity(demand.call_count());

    for (&group, group_pools) in demand.calls() {
        for (pool_id, kinds) in group_pools {
            let pool = pools
                .get(pool_id)
                .ok_or_else(|| SubscriptionError::UnknownPool(pool_id.clone()))?;
            let binding = bind_contract(abis, group, pool)?;
            for &kind in kinds {
                bound.push(binding.bind(pool, kind, user)?);
            }
        }
    }

    Ok(bound)
}

/// Executes all bound calls as a single batch and reassembles the results.
///
/// Any batch-level failure (transport, revert, wrong result count, undecodable
/// return data) fails the whole round; no partial results are returned.
pub async fn execute_calls(
    executor: &dyn BatchExecutor,
    bound: Vec<BoundCall>,
) -> Result<RoundResults, SubscriptionError> {
    if bound.is_empty() {
        return Ok(RoundResults::new());
    }

    let calls = bound.iter().map(|b| b.call.clone()).collect();
    let raw = executor
        .execute(calls)
        .await
        .map_err(SubscriptionError::BatchExecution)?;

    if raw.len() != bound.len() {
        return Err(SubscriptionError::BatchExecution(anyhow::anyhow!(
            "expected {} results, got {}",
            bound.len(),
            raw.len()
        )));
    }

    let mut results = RoundResults::new();
    for (call, data) in bound.iter().zip(raw.iter()) {
        let value = call.decode(data)?;
        results
            .entry(call.pool_id.clone())
            .or_default()
            .insert(call.kind, value);
    }

    debug!(calls = bound.len(), pools = results.len(), "batch results decoded");
    Ok(results)
}
