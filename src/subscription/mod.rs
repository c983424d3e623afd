//! # Launchpool subscriptions
//!
//! Demand-driven fetching of launchpool values. Views subscribe to the
//! metrics they display; the registry reference-counts those subscriptions,
//! and each aggregation round fetches only what is currently needed with a
//! single multicall before fanning results out as state updates.
//!
//! ```text
//! subscribe ─► registry ─► scheduler (debounce ─► throttle)
//!                                 │
//!                                 ▼
//!                 demand ─► calls ─► multicall ─► dispatcher ─► state
//! ```

pub mod aggregator;
pub mod calls;
pub mod catalog;
pub mod demand;
pub mod dispatcher;
pub mod engine;
pub mod registry;
pub mod scheduler;

pub use catalog::{CallKind, ContractGroup, Metric, UnknownMetric};
pub use dispatcher::Dispatch;
pub use engine::{RoundOutcome, SubscriptionEngine};
pub use registry::{MetricFlags, SubscriptionRegistry};
pub use scheduler::{SchedulerConfig, ThrottleDecision, UpdateScheduler};

use crate::contracts::AbiRegistry;
use crate::multicall::BatchExecutor;
use crate::pools::PoolCatalog;
use crate::wallet::WalletSession;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("Batch execution failed: {0:#}")]
    BatchExecution(anyhow::Error),
    #[error("Failed to decode {call} result for pool {pool_id}: {reason}")]
    Decode {
        pool_id: String,
        call: CallKind,
        reason: String,
    },
    #[error("No {call} result for pool {pool_id}")]
    MissingResult { pool_id: String, call: CallKind },
    #[error("Dispatch of {metric} for pool {pool_id} failed: {error:#}")]
    Dispatch {
        pool_id: String,
        metric: Metric,
        error: anyhow::Error,
    },
    #[error("Unknown pool: {0}")]
    UnknownPool(String),
    #[error(transparent)]
    UnknownMetric(#[from] UnknownMetric),
    #[error("Pool {pool_id} references unknown ABI {abi}")]
    UnknownAbi { pool_id: String, abi: String },
    #[error("ABI error for {call} on pool {pool_id}: {reason}")]
    Abi {
        pool_id: String,
        call: CallKind,
        reason: String,
    },
    #[error("{call} on pool {pool_id} needs a wallet address")]
    MissingAddress { pool_id: String, call: CallKind },
}

struct Release {
    registry: Arc<SubscriptionRegistry>,
    pool_id: String,
    flags: MetricFlags,
}

/// Undo token returned by `Subscriptions::subscribe`.
///
/// Releasing decrements exactly the counters the subscribe incremented.
/// `unsubscribe` consumes the handle, and dropping an unreleased handle
/// releases it, so a subscription is released at most once.
#[must_use = "dropping the handle releases the subscription"]
pub struct SubscriptionHandle {
    release: Option<Release>,
}

impl SubscriptionHandle {
    /// Handle of a subscribe call that flagged no metric.
    pub fn noop() -> Self {
        Self { release: None }
    }

    pub fn is_noop(&self) -> bool {
        self.release.is_none()
    }

    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release
                .registry
                .unsubscribe(&release.pool_id, &release.flags);
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.release {
            Some(release) => f
                .debug_struct("SubscriptionHandle")
                .field("pool_id", &release.pool_id)
                .field("flags", &release.flags)
                .finish(),
            None => f.write_str("SubscriptionHandle(noop)"),
        }
    }
}

/// Entry point for views: subscribe/unsubscribe and update requests.
///
/// Cheap to clone; clones share the registry, scheduler and wallet session.
#[derive(Clone)]
pub struct Subscriptions {
    engine: Arc<SubscriptionEngine>,
    scheduler: UpdateScheduler,
}

impl Subscriptions {
    pub fn new(
        pools: Arc<PoolCatalog>,
        abis: Arc<AbiRegistry>,
        wallet: WalletSession,
        executor: Arc<dyn BatchExecutor>,
        sink: Arc<dyn Dispatch>,
        config: SchedulerConfig,
    ) -> Self {
        let engine = Arc::new(SubscriptionEngine::new(
            pools,
            abis,
            Arc::new(SubscriptionRegistry::new()),
            wallet,
            executor,
            sink,
        ));
        let scheduler = UpdateScheduler::new(engine.clone(), config);
        Self { engine, scheduler }
    }

    pub fn engine(&self) -> &Arc<SubscriptionEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        self.engine.registry()
    }

    pub fn scheduler(&self) -> &UpdateScheduler {
        &self.scheduler
    }

    pub fn wallet(&self) -> &WalletSession {
        self.engine.wallet()
    }

    /// Subscribes to the flagged metrics of `pool_id` and requests a
    /// (debounced) update. No flagged metric: no-op handle, no update.
    pub fn subscribe(
        &self,
        pool_id: &str,
        flags: MetricFlags,
    ) -> Result<SubscriptionHandle, SubscriptionError> {
        if !self.engine.pools().contains(pool_id) {
            return Err(SubscriptionError::UnknownPool(pool_id.to_string()));
        }
        if !self.registry().subscribe(pool_id, &flags) {
            return Ok(SubscriptionHandle::noop());
        }

        self.scheduler.request_update();
        Ok(SubscriptionHandle {
            release: Some(Release {
                registry: self.registry().clone(),
                pool_id: pool_id.to_string(),
                flags,
            }),
        })
    }

    /// Decrements the flagged metrics directly, clamped at zero.
    pub fn unsubscribe(&self, pool_id: &str, flags: &MetricFlags) {
        self.registry().unsubscribe(pool_id, flags);
    }

    /// Debounced, throttled update request.
    pub fn update(&self) {
        self.scheduler.request_update();
    }

    /// Immediate update, e.g. after a confirmed transaction.
    pub fn update_now(&self) -> JoinHandle<()> {
        self.scheduler.run_now()
    }

    /// Requests an update every `period`, and an immediate one whenever a
    /// wallet address becomes available. Abort the handle to stop.
    pub fn spawn_periodic_updates(&self, period: Duration) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut wallet = this.wallet().subscribe();
            let mut last_address = *wallet.borrow_and_update();

            loop {
                tokio::select! {
                    _ = ticker.tick() => this.update(),
                    changed = wallet.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let address = *wallet.borrow_and_update();
                        if address.is_some() && address != last_address {
                            debug!("wallet address available, updating now");
                            this.update_now();
                        }
                        last_address = address;
                    }
                }
            }
        })
    }
}
