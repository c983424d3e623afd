//! Integration tests for subscription rounds
//!
//! Tests cover:
//! - Demand-driven call selection (only subscribed values are fetched)
//! - Pool status derivation from `periodFinish`
//! - User metrics gated on a connected wallet
//! - Batch failures leaving state untouched
//!
//! The chain is replaced by a mock batch executor answering by target and
//! function selector.

use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::{Address, Bytes, U256};
use ethers::utils::id;
use launchpool_sync::contracts::AbiRegistry;
use launchpool_sync::multicall::{BatchExecutor, Call};
use launchpool_sync::subscription::{RoundOutcome, SchedulerConfig, SubscriptionError};
use launchpool_sync::{
    Metric, MetricFlags, PoolCatalog, PoolDescriptor, PoolStatus, StakeStore, Subscriptions,
    WalletSession,
};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const FAR_FUTURE: u64 = 4_000_000_000;

fn addr(s: &str) -> Address {
    Address::from_str(s).unwrap()
}

fn token_a() -> Address {
    addr("0x1111111111111111111111111111111111111111")
}
fn earn_a() -> Address {
    addr("0x2222222222222222222222222222222222222222")
}
fn token_b() -> Address {
    addr("0x3333333333333333333333333333333333333333")
}
fn earn_b() -> Address {
    addr("0x4444444444444444444444444444444444444444")
}
fn user() -> Address {
    addr("0x9999999999999999999999999999999999999999")
}

fn descriptor(id: &str, token: Address, earn: Address) -> PoolDescriptor {
    PoolDescriptor {
        id: id.to_string(),
        name: id.to_uppercase(),
        token: "mooToken".to_string(),
        token_address: token,
        token_decimals: 18,
        earned_token: "BIFI".to_string(),
        earn_contract_address: earn,
        earn_contract_abi: "launchpool".to_string(),
        earned_token_decimals: 18,
        status: PoolStatus::Active,
        period_finish: None,
        hide_countdown: false,
        partnership: false,
    }
}

fn selector(signature: &str) -> [u8; 4] {
    let hash = id(signature);
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Answers `uint256` reads from a fixed table and records every batch.
#[derive(Default)]
struct MockChain {
    answers: HashMap<(Address, [u8; 4]), U256>,
    batches: Mutex<Vec<Vec<Call>>>,
}

impl MockChain {
    fn answer(mut self, target: Address, signature: &str, value: u64) -> Self {
        self.answers
            .insert((target, selector(signature)), U256::from(value));
        self
    }

    fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    fn last_batch(&self) -> Vec<Call> {
        self.batches.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl BatchExecutor for MockChain {
    async fn execute(&self, calls: Vec<Call>) -> anyhow::Result<Vec<Bytes>> {
        self.batches.lock().unwrap().push(calls.clone());
        calls
            .iter()
            .map(|call| {
                let mut sel = [0u8; 4];
                sel.copy_from_slice(&call.call_data[..4]);
                let value = self
                    .answers
                    .get(&(call.target, sel))
                    .ok_or_else(|| anyhow::anyhow!("execution reverted"))?;
                Ok(Bytes::from(ethers::abi::encode(&[Token::Uint(*value)])))
            })
            .collect()
    }
}

fn chain() -> MockChain {
    MockChain::default()
        .answer(earn_a(), "periodFinish()", FAR_FUTURE)
        .answer(earn_b(), "periodFinish()", 1)
        .answer(earn_a(), "rewardRate()", 7)
        .answer(earn_a(), "totalSupply()", 5_000)
        .answer(token_a(), "getPricePerFullShare()", 1_000_000_000_000_000_000)
        .answer(token_a(), "allowance(address,address)", 123)
        .answer(token_a(), "balanceOf(address)", 10)
        .answer(earn_a(), "balanceOf(address)", 20)
        .answer(earn_a(), "earned(address)", 30)
}

struct Harness {
    subscriptions: Subscriptions,
    store: Arc<StakeStore>,
    chain: Arc<MockChain>,
    wallet: WalletSession,
}

fn harness(chain: MockChain) -> Harness {
    let pools = Arc::new(
        PoolCatalog::new(vec![
            descriptor("pool-a", token_a(), earn_a()),
            descriptor("pool-b", token_b(), earn_b()),
        ])
        .unwrap(),
    );
    let store = Arc::new(StakeStore::new(&pools));
    let chain = Arc::new(chain);
    let wallet = WalletSession::new();
    let subscriptions = Subscriptions::new(
        pools,
        Arc::new(AbiRegistry::with_standard().unwrap()),
        wallet.clone(),
        chain.clone(),
        store.clone(),
        SchedulerConfig::default(),
    );
    Harness {
        subscriptions,
        store,
        chain,
        wallet,
    }
}

fn only(metric: Metric) -> MetricFlags {
    MetricFlags::new().with(metric, true)
}

/// List view: only `periodFinish` of each pool is fetched, and statuses
/// follow the on-chain finish time
#[tokio::test]
async fn test_list_view_round_fetches_finish_only() {
    let h = harness(chain());
    let _a = h.subscriptions.subscribe("pool-a", only(Metric::PoolFinish)).unwrap();
    let _b = h.subscriptions.subscribe("pool-b", only(Metric::PoolFinish)).unwrap();
    h.subscriptions.scheduler().cancel();

    let outcome = h.subscriptions.engine().update_pools().await.unwrap();
    assert_eq!(
        outcome,
        RoundOutcome::Executed {
            calls: 2,
            pools: 2,
            dispatched: 2,
            failed: 0
        }
    );

    let batch = h.chain.last_batch();
    assert!(batch
        .iter()
        .all(|c| c.call_data.to_vec() == selector("periodFinish()").to_vec()));

    let a = h.store.pool("pool-a").unwrap();
    assert_eq!(a.pool_finish, Some(U256::from(FAR_FUTURE)));
    assert_eq!(a.pool_status, PoolStatus::Active);

    let b = h.store.pool("pool-b").unwrap();
    assert_eq!(b.pool_finish, Some(U256::one()));
    assert_eq!(b.pool_status, PoolStatus::Closed);
}

/// Shared calls are fetched once per pool even when several metrics need them
#[tokio::test]
async fn test_detail_view_merges_shared_calls() {
    let h = harness(chain());
    let flags: MetricFlags = [Metric::PoolApy, Metric::PoolStaked, Metric::PoolTvl]
        .into_iter()
        .collect();
    let _handle = h.subscriptions.subscribe("pool-a", flags).unwrap();
    h.subscriptions.scheduler().cancel();

    let outcome = h.subscriptions.engine().update_pools().await.unwrap();
    // rewardRate + totalSupply + getPricePerFullShare
    assert!(matches!(outcome, RoundOutcome::Executed { calls: 3, dispatched: 3, .. }));

    let a = h.store.pool("pool-a").unwrap();
    assert_eq!(a.pool_staked, U256::from(5_000u64));
    assert_eq!(a.pool_tvl, U256::from(5_000u64));
    let apy = a.pool_apy.unwrap();
    assert_eq!(apy.reward_rate, U256::from(7u64));
    assert_eq!(apy.total_staked, U256::from(5_000u64));
    assert_eq!(apy.price_per_share, U256::exp10(18));
}

/// User metrics are skipped without a wallet and fetched once one connects
#[tokio::test]
async fn test_user_metrics_wait_for_wallet() {
    let h = harness(chain());
    let flags: MetricFlags = [
        Metric::UserApproval,
        Metric::UserBalance,
        Metric::UserStaked,
        Metric::UserRewardsAvailable,
    ]
    .into_iter()
    .collect();
    let _handle = h.subscriptions.subscribe("pool-a", flags).unwrap();
    h.subscriptions.scheduler().cancel();

    let outcome = h.subscriptions.engine().update_pools().await.unwrap();
    assert_eq!(outcome, RoundOutcome::Skipped);
    assert_eq!(h.chain.batch_count(), 0);

    h.wallet.connect(user());
    let outcome = h.subscriptions.engine().update_pools().await.unwrap();
    assert!(matches!(outcome, RoundOutcome::Executed { calls: 4, failed: 0, .. }));

    let a = h.store.pool("pool-a").unwrap();
    assert_eq!(a.user_approval, U256::from(123u64));
    assert_eq!(a.user_balance, U256::from(10u64));
    assert_eq!(a.user_staked, U256::from(20u64));
    assert_eq!(a.user_rewards_available, U256::from(30u64));
}

/// A subscribe with every flag false never reaches the chain
#[tokio::test]
async fn test_all_false_subscription_makes_no_rpc_call() {
    let h = harness(chain());
    let flags: MetricFlags = Metric::ALL.iter().map(|&m| (m, false)).collect();
    let handle = h.subscriptions.subscribe("pool-a", flags).unwrap();
    assert!(handle.is_noop());

    let outcome = h.subscriptions.engine().update_pools().await.unwrap();
    assert_eq!(outcome, RoundOutcome::Skipped);
    assert_eq!(h.chain.batch_count(), 0);
}

/// Releasing the last handle stops the pool from being fetched
#[tokio::test]
async fn test_released_subscriptions_are_not_fetched() {
    let h = harness(chain());
    let a = h.subscriptions.subscribe("pool-a", only(Metric::PoolFinish)).unwrap();
    let b = h.subscriptions.subscribe("pool-b", only(Metric::PoolFinish)).unwrap();
    h.subscriptions.scheduler().cancel();

    b.unsubscribe();
    h.subscriptions.engine().update_pools().await.unwrap();
    let batch = h.chain.last_batch();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].target, earn_a());

    drop(a);
    let outcome = h.subscriptions.engine().update_pools().await.unwrap();
    assert_eq!(outcome, RoundOutcome::Skipped);
    assert_eq!(h.chain.batch_count(), 1);
}

/// One reverting call fails the whole batch and no field is updated
#[tokio::test]
async fn test_failed_batch_leaves_state_unchanged() {
    // pool-b has no periodFinish answer
    let h = harness(MockChain::default().answer(earn_a(), "periodFinish()", FAR_FUTURE));
    let _a = h.subscriptions.subscribe("pool-a", only(Metric::PoolFinish)).unwrap();
    let _b = h.subscriptions.subscribe("pool-b", only(Metric::PoolFinish)).unwrap();
    h.subscriptions.scheduler().cancel();

    let before = h.store.snapshot();
    let result = h.subscriptions.engine().update_pools().await;
    assert!(matches!(result, Err(SubscriptionError::BatchExecution(_))));
    assert_eq!(h.store.snapshot(), before);
}

/// A subscribe schedules a debounced round without any explicit update call
#[tokio::test(start_paused = true)]
async fn test_subscribe_triggers_debounced_round() {
    let h = harness(chain());
    let _a = h.subscriptions.subscribe("pool-a", only(Metric::PoolFinish)).unwrap();
    assert_eq!(h.chain.batch_count(), 0);

    tokio::time::sleep(Duration::from_millis(150)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert_eq!(h.chain.batch_count(), 1);
    assert_eq!(
        h.store.pool("pool-a").unwrap().pool_finish,
        Some(U256::from(FAR_FUTURE))
    );
}

/// Connecting a wallet fires an immediate round through the periodic task
#[tokio::test(start_paused = true)]
async fn test_wallet_connect_triggers_immediate_round() {
    let h = harness(chain());
    let _handle = h
        .subscriptions
        .subscribe("pool-a", only(Metric::UserBalance))
        .unwrap();
    let periodic = h
        .subscriptions
        .spawn_periodic_updates(Duration::from_secs(30));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(h.chain.batch_count(), 0);

    h.wallet.connect(user());
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(h.chain.batch_count(), 1);
    assert_eq!(h.store.pool("pool-a").unwrap().user_balance, U256::from(10u64));

    periodic.abort();
}

/// The periodic tick requests an update that goes through the debounce stage
#[tokio::test(start_paused = true)]
async fn test_periodic_tick_requests_debounced_round() {
    let h = harness(chain());
    let _handle = h
        .subscriptions
        .subscribe("pool-a", only(Metric::PoolFinish))
        .unwrap();
    let periodic = h
        .subscriptions
        .spawn_periodic_updates(Duration::from_secs(30));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(h.chain.batch_count(), 1, "subscribe round");

    // just past the first tick, still inside the debounce window
    tokio::time::sleep(Duration::from_millis(29_900)).await;
    assert_eq!(h.chain.batch_count(), 1);
    assert!(h.subscriptions.scheduler().has_pending_debounce());

    tokio::time::sleep(Duration::from_millis(100)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(h.chain.batch_count(), 2, "tick round");
    assert!(!h.subscriptions.scheduler().has_pending_deferred());

    periodic.abort();
}
