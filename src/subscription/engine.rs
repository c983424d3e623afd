//! One aggregation round: snapshot → resolve → batch → dispatch.

use super::aggregator::{build_calls, execute_calls};
use super::demand::resolve;
use super::dispatcher::{dispatch_round, Dispatch};
use super::registry::SubscriptionRegistry;
use super::scheduler::RoundRunner;
use super::SubscriptionError;
use crate::contracts::AbiRegistry;
use crate::metrics;
use crate::multicall::BatchExecutor;
use crate::pools::PoolCatalog;
use crate::wallet::WalletSession;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// No admitted demand; nothing was sent to the chain
    Skipped,
    Executed {
        calls: usize,
        pools: usize,
        dispatched: usize,
        failed: usize,
    },
}

pub struct SubscriptionEngine {
    pools: Arc<PoolCatalog>,
    abis: Arc<AbiRegistry>,
    registry: Arc<SubscriptionRegistry>,
    wallet: WalletSession,
    executor: Arc<dyn BatchExecutor>,
    sink: Arc<dyn Dispatch>,
}

impl SubscriptionEngine {
    pub fn new(
        pools: Arc<PoolCatalog>,
        abis: Arc<AbiRegistry>,
        registry: Arc<SubscriptionRegistry>,
        wallet: WalletSession,
        executor: Arc<dyn BatchExecutor>,
        sink: Arc<dyn Dispatch>,
    ) -> Self {
        Self {
            pools,
            abis,
            registry,
            wallet,
            executor,
            sink,
        }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn pools(&self) -> &Arc<PoolCatalog> {
        &self.pools
    }

    pub fn wallet(&self) -> &WalletSession {
        &self.wallet
    }

    /// Runs one round against a snapshot taken now.
    ///
    /// A batch failure returns `Err` without dispatching anything. Dispatch
    /// failures are per metric and only counted in the outcome.
    pub async fn update_pools(&self) -> Result<RoundOutcome, SubscriptionError> {
        let snapshot = self.registry.snapshot();
        let user = self.wallet.address();
        let demand = resolve(&snapshot, user.is_some());

        if demand.is_empty() {
            debug!("no active subscriptions, round skipped");
            metrics::increment_round("skipped");
            return Ok(RoundOutcome::Skipped);
        }

        let start = Instant::now();
        let bound = build_calls(&self.pools, &self.abis, &demand, user)?;
        let calls = bound.len();
        let results = execute_calls(self.executor.as_ref(), bound).await?;
        let report = dispatch_round(
            self.sink.as_ref(),
            &self.pools,
            &demand,
            &results,
            Utc::now(),
        )
        .await;

        metrics::increment_round("executed");
        metrics::record_round_duration_ms(start.elapsed().as_millis() as f64);
        info!(
            calls,
            pools = demand.pool_count(),
            dispatched = report.dispatched,
            failed = report.failures.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "subscription round complete"
        );

        Ok(RoundOutcome::Executed {
            calls,
            pools: demand.pool_count(),
            dispatched: report.dispatched,
            failed: report.failures.len(),
        })
    }
}

#[async_trait]
impl RoundRunner for SubscriptionEngine {
    /// Failed rounds are logged and retried on the next scheduled round.
    async fn run_round(&self) {
        if let Err(e) = self.update_pools().await {
            metrics::increment_round("failed");
            warn!(error = %e, "subscription round failed, state left unchanged");
        }
    }
}
