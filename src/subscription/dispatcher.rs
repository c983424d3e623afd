//! Result dispatch: decoded call results → per-field state updates.

use super::aggregator::{PoolResults, RoundResults};
use super::catalog::{CallKind, Metric};
use super::demand::Demand;
use super::SubscriptionError;
use crate::metrics;
use crate::pools::{PoolCatalog, PoolDescriptor, PoolStatus};
use crate::state::{ApyInputs, StateUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers::prelude::U256;
use futures::future::join_all;
use tracing::warn;

/// Sink for state updates (the application state store).
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, update: StateUpdate) -> anyhow::Result<()>;
}

/// Effective status of a pool given its on-chain `periodFinish`.
///
/// Only nominally active pools are re-derived: a zero finish means the reward
/// period has not started yet (`Soon`), a finish strictly in the past means
/// the pool is `Closed`.
pub fn derive_pool_status(nominal: PoolStatus, finish: U256, now: DateTime<Utc>) -> PoolStatus {
    if nominal != PoolStatus::Active {
        return nominal;
    }
    if finish.is_zero() {
        return PoolStatus::Soon;
    }

    let now_ms = U256::from(now.timestamp_millis().max(0) as u64);
    match finish.checked_mul(U256::from(1000u64)) {
        Some(finish_ms) if finish_ms < now_ms => PoolStatus::Closed,
        _ => PoolStatus::Active,
    }
}

/// Builds the update for one admitted metric of one pool.
pub fn build_update(
    metric: Metric,
    pool: &PoolDescriptor,
    results: Option<&PoolResults>,
    now: DateTime<Utc>,
) -> Result<StateUpdate, SubscriptionError> {
    let value = |call: CallKind| -> Result<U256, SubscriptionError> {
        results
            .and_then(|r| r.get(&call))
            .copied()
            .ok_or_else(|| SubscriptionError::MissingResult {
                pool_id: pool.id.clone(),
                call,
            })
    };
    let pool_id = pool.id.clone();

    Ok(match metric {
        Metric::UserApproval => StateUpdate::UserApproval {
            pool_id,
            allowance: value(CallKind::UserApproval)?,
        },
        Metric::UserBalance => StateUpdate::UserBalance {
            pool_id,
            balance: value(CallKind::UserBalance)?,
        },
        Metric::UserStaked => StateUpdate::UserStaked {
            pool_id,
            staked: value(CallKind::UserStaked)?,
        },
        Metric::UserRewardsAvailable => StateUpdate::UserRewardsAvailable {
            pool_id,
            rewards: value(CallKind::UserRewardsAvailable)?,
        },
        Metric::PoolApy => StateUpdate::PoolApy {
            pool_id,
            inputs: ApyInputs {
                reward_rate: value(CallKind::PoolRewardRate)?,
                total_staked: value(CallKind::PoolStaked)?,
                price_per_share: value(CallKind::TokenPricePerShare)?,
            },
        },
        Metric::PoolStaked => StateUpdate::PoolStaked {
            pool_id,
            total_staked: value(CallKind::PoolStaked)?,
        },
        Metric::PoolTvl => StateUpdate::PoolTvl {
            pool_id,
            total_staked: value(CallKind::PoolStaked)?,
        },
        Metric::PoolFinish => {
            let finish = value(CallKind::PoolFinish)?;
            StateUpdate::PoolFinish {
                pool_id,
                finish,
                status: derive_pool_status(pool.status, finish, now),
            }
        }
    })
}

/// Outcome of dispatching one round.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub dispatched: usize,
    pub failures: Vec<SubscriptionError>,
}

/// Dispatches every admitted (pool, metric) of the round concurrently.
///
/// Failures are isolated per metric: they are logged and collected in the
/// report, and never stop sibling updates.
pub async fn dispatch_round(
    sink: &dyn Dispatch,
    pools: &PoolCatalog,
    demand: &Demand,
    results: &RoundResults,
    now: DateTime<Utc>,
) -> DispatchReport {
    let mut report = DispatchReport::default();
    let mut pending = Vec::new();

    for (pool_id, admitted) in demand.admitted() {
        let Some(pool) = pools.get(pool_id) else {
            report
                .failures
                .push(SubscriptionError::UnknownPool(pool_id.clone()));
            continue;
        };
        for &metric in admitted {
            match build_update(metric, pool, results.get(pool_id), now) {
                Ok(update) => pending.push(async move {
                    sink.dispatch(update)
                        .await
                        .map_err(|error| SubscriptionError::Dispatch {
                            pool_id: pool_id.clone(),
                            metric,
                            error,
                        })
                }),
                Err(e) => report.failures.push(SubscriptionError::Dispatch {
                    pool_id: pool_id.clone(),
                    metric,
                    error: e.into(),
                }),
            }
        }
    }

    for outcome in join_all(pending).await {
        match outcome {
            Ok(()) => report.dispatched += 1,
            Err(e) => report.failures.push(e),
        }
    }

    for failure in &report.failures {
        if let SubscriptionError::Dispatch { metric, .. } = failure {
            metrics::increment_dispatch_failure(metric.as_str());
        }
        warn!(error = %failure, "dispatch failed");
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pools::test_support::pool;
    use chrono::Duration;
    use std::sync::Mutex;

    fn at(now: DateTime<Utc>, offset: Duration) -> U256 {
        U256::from((now + offset).timestamp() as u64)
    }

    #[test]
    fn test_active_with_zero_finish_is_soon() {
        let now = Utc::now();
        assert_eq!(
            derive_pool_status(PoolStatus::Active, U256::zero(), now),
            PoolStatus::Soon
        );
    }

    #[test]
    fn test_active_with_past_finish_is_closed() {
        let now = Utc::now();
        let finish = at(now, Duration::seconds(-100));
        assert_eq!(
            derive_pool_status(PoolStatus::Active, finish, now),
            PoolStatus::Closed
        );
    }

    #[test]
    fn test_active_with_future_finish_stays_active() {
        let now = Utc::now();
        let finish = at(now, Duration::hours(1));
        assert_eq!(
            derive_pool_status(PoolStatus::Active, finish, now),
            PoolStatus::Active
        );
    }

    #[test]
    fn test_non_active_status_is_never_rederived() {
        let now = Utc::now();
        let finishes = [
            U256::zero(),
            at(now, Duration::hours(1)),
            at(now, Duration::seconds(-100)),
        ];
        for finish in finishes {
            assert_eq!(
                derive_pool_status(PoolStatus::Closed, finish, now),
                PoolStatus::Closed
            );
            assert_eq!(
                derive_pool_status(PoolStatus::Soon, finish, now),
                PoolStatus::Soon
            );
        }
    }

    #[test]
    fn test_huge_finish_does_not_overflow() {
        assert_eq!(
            derive_pool_status(PoolStatus::Active, U256::MAX, Utc::now()),
            PoolStatus::Active
        );
    }

    #[test]
    fn test_build_update_requires_all_calls() {
        let pool = pool("pool-a", PoolStatus::Active);
        let mut results = PoolResults::new();
        results.insert(CallKind::PoolRewardRate, U256::one());
        results.insert(CallKind::PoolStaked, U256::from(2u64));

        let missing = build_update(Metric::PoolApy, &pool, Some(&results), Utc::now());
        assert!(matches!(
            missing,
            Err(SubscriptionError::MissingResult {
                call: CallKind::TokenPricePerShare,
                ..
            })
        ));

        let tvl = build_update(Metric::PoolTvl, &pool, Some(&results), Utc::now()).unwrap();
        assert_eq!(
            tvl,
            StateUpdate::PoolTvl {
                pool_id: "pool-a".to_string(),
                total_staked: U256::from(2u64)
            }
        );
    }

    /// Rejects every update for `reject`, records the rest.
    struct RecordingSink {
        reject: Metric,
        applied: Mutex<Vec<StateUpdate>>,
    }

    #[async_trait]
    impl Dispatch for RecordingSink {
        async fn dispatch(&self, update: StateUpdate) -> anyhow::Result<()> {
            let is_rejected = matches!(
                (&update, self.reject),
                (StateUpdate::PoolStaked { .. }, Metric::PoolStaked)
            );
            if is_rejected {
                anyhow::bail!("store unavailable");
            }
            self.applied.lock().unwrap().push(update);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failing_metric_does_not_block_siblings() {
        use crate::subscription::demand::resolve;
        use crate::subscription::registry::RegistrySnapshot;

        let catalog = PoolCatalog::new(vec![pool("pool-a", PoolStatus::Active)]).unwrap();
        let snapshot: RegistrySnapshot = [
            ("pool-a", Metric::PoolStaked, 1),
            ("pool-a", Metric::PoolTvl, 1),
            ("pool-a", Metric::PoolFinish, 1),
        ]
        .into_iter()
        .collect();
        let demand = resolve(&snapshot, false);

        let mut pool_results = PoolResults::new();
        pool_results.insert(CallKind::PoolStaked, U256::from(7u64));
        pool_results.insert(CallKind::PoolFinish, U256::zero());
        let mut results = RoundResults::new();
        results.insert("pool-a".to_string(), pool_results);

        let sink = RecordingSink {
            reject: Metric::PoolStaked,
            applied: Mutex::new(vec![]),
        };
        let report = dispatch_round(&sink, &catalog, &demand, &results, Utc::now()).await;

        assert_eq!(report.dispatched, 2);
        assert_eq!(report.failures.len(), 1);
        match &report.failures[0] {
            SubscriptionError::Dispatch {
                pool_id,
                metric,
                error,
            } => {
                assert_eq!(pool_id, "pool-a");
                assert_eq!(*metric, Metric::PoolStaked);
                assert_eq!(error.to_string(), "store unavailable");
            }
            other => panic!("unexpected failure: {other}"),
        }
        assert_eq!(
            report.failures[0].to_string(),
            "Dispatch of poolStaked for pool pool-a failed: store unavailable"
        );
        let applied = sink.applied.lock().unwrap();
        assert!(applied.iter().any(|u| matches!(
            u,
            StateUpdate::PoolFinish {
                status: PoolStatus::Soon,
                ..
            }
        )));
    }
}
