//! # Launchpool Watcher
//!
//! Service binary that keeps launchpool values in sync and prints every
//! state update it receives.
//!
//! ## Overview
//!
//! This service:
//! - Subscribes the requested pools (or every open pool's finish time)
//! - Runs debounced/throttled multicall rounds plus a periodic refresh
//! - Prints each applied update with token decimals applied
//! - Releases all subscriptions on Ctrl+C
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin launchpool_watcher -- --pool moo_auto_wbnb-bifi --address 0x...
//! ```

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use ethers::prelude::{Address, Http, Provider};
use launchpool_sync::{
    format::{countdown_status, format_amount, format_countdown, CountdownStatus},
    Metric, MetricFlags, Multicall, PoolCatalog, PoolDescriptor, PoolStatus, Settings, StakeStore,
    StateUpdate, SubscriptionHandle, Subscriptions, WalletSession,
};
use log::{info, warn};
use std::str::FromStr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser, Debug)]
#[command(name = "launchpool_watcher", about = "Watch launchpool values over multicall")]
struct Args {
    /// Configuration file (defaults to $LAUNCHPOOL_CONFIG or Config.toml)
    #[arg(long)]
    config: Option<String>,

    /// Network key from the configuration
    #[arg(long)]
    network: Option<String>,

    /// Pool to watch in detail (repeatable)
    #[arg(long = "pool")]
    pools: Vec<String>,

    /// Wallet address for user metrics
    #[arg(long)]
    address: Option<String>,

    /// Metrics to subscribe for `--pool` (defaults to all)
    #[arg(long, value_delimiter = ',')]
    metrics: Vec<Metric>,
}

fn init_logging() {
    #[cfg(feature = "observability")]
    {
        tracing_subscriber::fmt().init();
    }
    #[cfg(not(feature = "observability"))]
    env_logger::init();
}

#[cfg(feature = "observability")]
fn init_metrics() -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new().install()?;
    launchpool_sync::metrics::describe_metrics();
    Ok(())
}

#[cfg(not(feature = "observability"))]
fn init_metrics() -> Result<()> {
    Ok(())
}

fn describe(pool: &PoolDescriptor, update: &StateUpdate) -> String {
    let token = |raw| format_amount(raw, pool.token_decimals);
    match update {
        StateUpdate::UserApproval { allowance, .. } => format!("allowance {}", token(*allowance)),
        StateUpdate::UserBalance { balance, .. } => {
            format!("wallet balance {} {}", token(*balance), pool.token)
        }
        StateUpdate::UserStaked { staked, .. } => {
            format!("staked {} {}", token(*staked), pool.token)
        }
        StateUpdate::UserRewardsAvailable { rewards, .. } => format!(
            "rewards {} {}",
            format_amount(*rewards, pool.earned_token_decimals),
            pool.earned_token
        ),
        StateUpdate::PoolApy { inputs, .. } => format!(
            "reward rate {} {}/s, total staked {}, price per share {}",
            format_amount(inputs.reward_rate, pool.earned_token_decimals),
            pool.earned_token,
            token(inputs.total_staked),
            format_amount(inputs.price_per_share, 18)
        ),
        StateUpdate::PoolStaked { total_staked, .. } => {
            format!("total staked {} {}", token(*total_staked), pool.token)
        }
        StateUpdate::PoolTvl { total_staked, .. } => {
            format!("tvl base {} {}", token(*total_staked), pool.token)
        }
        StateUpdate::PoolFinish { finish, status, .. } => {
            match countdown_status(*status, Some(*finish), pool.hide_countdown, Utc::now()) {
                CountdownStatus::Ends(remaining) => {
                    format!("{}, ends in {}", status, format_countdown(remaining))
                }
                other => format!("{} ({:?})", status, other),
            }
        }
        StateUpdate::TransactionPending { action, pending, .. } => {
            format!("{} pending: {}", action, pending)
        }
    }
}

fn subscribe_all(
    subscriptions: &Subscriptions,
    pools: &PoolCatalog,
    args: &Args,
) -> Result<Vec<SubscriptionHandle>> {
    let mut handles = Vec::new();

    if args.pools.is_empty() {
        // List view: only the countdown of pools that are not closed
        let flags = MetricFlags::new().with(Metric::PoolFinish, true);
        for pool in pools.iter().filter(|p| p.status != PoolStatus::Closed) {
            handles.push(subscriptions.subscribe(&pool.id, flags.clone())?);
        }
        return Ok(handles);
    }

    let flags = if args.metrics.is_empty() {
        MetricFlags::all()
    } else {
        args.metrics.iter().copied().collect()
    };
    for pool_id in &args.pools {
        handles.push(subscriptions.subscribe(pool_id, flags.clone())?);
    }
    Ok(handles)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_logging();
    init_metrics()?;

    let args = Args::parse();

    println!("🚀 Starting Launchpool Watcher");
    println!("═══════════════════════════════════════════════════════════════════\n");

    // 1. Load settings
    if let Some(network) = &args.network {
        std::env::set_var("LAUNCHPOOL_NETWORK", network);
    }
    let settings = match &args.config {
        Some(path) => Settings::from_path(path)?,
        None => Settings::new()?,
    };
    let network = settings.active_network()?;
    println!("✅ Settings loaded (network: {})", settings.network);

    // 2. Pools and ABIs
    let pools = Arc::new(settings.pool_catalog()?);
    let abis = Arc::new(settings.abi_registry()?);
    println!("✅ {} pools configured", pools.len());

    // 3. Chain access
    let provider = Arc::new(Provider::<Http>::try_from(network.rpc_url.as_str())?);
    let multicall = Multicall::new(
        provider,
        network.multicall_address,
        settings.multicall.batch_size,
    )
    .with_timeout(settings.multicall.timeout_seconds);
    println!("✅ Multicall ready (batch size {})", multicall.batch_size());

    // 4. State store and subscriptions
    let store = Arc::new(StakeStore::new(&pools));
    let wallet = WalletSession::new();
    if let Some(address) = &args.address {
        let address = Address::from_str(address)
            .map_err(|e| anyhow::anyhow!("Invalid address {}: {}", address, e))?;
        wallet.connect(address);
    }

    let subscriptions = Subscriptions::new(
        pools.clone(),
        abis,
        wallet,
        Arc::new(multicall),
        store.clone(),
        settings.scheduler.scheduler_config(),
    );

    let mut updates = store.subscribe_updates();
    let printer_pools = pools.clone();
    let printer = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(update) => {
                    if let Some(pool) = printer_pools.get(update.pool_id()) {
                        println!("[{}] {}", pool.name, describe(pool, &update));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Printer lagged, {} updates skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let handles = subscribe_all(&subscriptions, &pools, &args)?;
    println!("✅ {} subscriptions active", handles.len());

    let periodic = subscriptions.spawn_periodic_updates(settings.scheduler.update_interval());
    println!("\n👀 Watching... (Ctrl+C to stop)\n");

    signal::ctrl_c().await?;
    info!("Shutdown requested");

    periodic.abort();
    subscriptions.scheduler().cancel();
    for handle in handles {
        handle.unsubscribe();
    }
    printer.abort();

    println!("\n👋 Launchpool Watcher stopped");
    Ok(())
}
