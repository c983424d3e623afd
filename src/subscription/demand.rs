//! Demand resolution: registry snapshot → calls to execute this round.

use super::catalog::{CallKind, ContractGroup, Metric};
use super::registry::RegistrySnapshot;
use std::collections::{BTreeMap, BTreeSet};

/// Calls grouped as contract group → pool id → call kinds.
pub type RequestedCalls = BTreeMap<ContractGroup, BTreeMap<String, BTreeSet<CallKind>>>;

/// The admitted demand of one round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Demand {
    admitted: BTreeMap<String, Vec<Metric>>,
    calls: RequestedCalls,
}

impl Demand {
    /// Nothing to fetch: the round is skipped without touching the RPC.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Metrics to dispatch, per pool
    pub fn admitted(&self) -> &BTreeMap<String, Vec<Metric>> {
        &self.admitted
    }

    pub fn calls(&self) -> &RequestedCalls {
        &self.calls
    }

    pub fn pool_count(&self) -> usize {
        self.admitted.len()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .values()
            .flat_map(|pools| pools.values())
            .map(BTreeSet::len)
            .sum()
    }
}

/// Computes the minimal call set for the active subscriptions.
///
/// A (pool, metric) pair is admitted when its count is positive and either a
/// user address is available or the metric does not need one. Each admitted
/// metric expands to its catalog calls, bucketed by contract group.
pub fn resolve(snapshot: &RegistrySnapshot, has_address: bool) -> Demand {
    let mut demand = Demand::default();

    for (pool_id, metric) in snapshot.active() {
        if metric.needs_address() && !has_address {
            continue;
        }

        demand
            .admitted
            .entry(pool_id.to_string())
            .or_default()
            .push(metric);

        for &call in metric.calls() {
            demand
                .calls
                .entry(call.group())
                .or_default()
                .entry(pool_id.to_string())
                .or_default()
                .insert(call);
        }
    }

    demand
}
