//! # Launchpool Sync
//!
//! Demand-driven synchronization of launchpool staking data for wallet-facing
//! front ends. Views declare which values they display; the crate batches
//! exactly those reads into one Multicall3 round and feeds the results into an
//! application state store.
//!
//! ## Overview
//!
//! - **Subscriptions**: reference-counted interest in per-pool metrics
//! - **Aggregation**: demand resolution, call building and a single batched read
//! - **Dispatch**: per-metric state updates with pool status derivation
//! - **Scheduling**: debounced, throttled rounds plus a periodic refresh
//!
//! ## Architecture
//!
//! ### Configuration Layer
//! Network selection, pool descriptors and reward ABIs (`settings`, `pools`,
//! `contracts`).
//!
//! ### Chain Access Layer
//! Multicall3 batching behind the `BatchExecutor` seam (`multicall`).
//!
//! ### Subscription Layer
//! Registry, demand resolver, aggregator, dispatcher and scheduler
//! (`subscription`).
//!
//! ### State & Presentation Layer
//! `StakeStore` reducer with change broadcasts (`state`) and decimal/APY/
//! countdown helpers (`format`).

// Configuration
/// Configuration loading and validation
pub mod settings;
/// Launchpool descriptors and catalog
pub mod pools;
/// Standard ABIs and the reward ABI registry
pub mod contracts;

// Chain access
/// Multicall3 batch executor
pub mod multicall;
/// Wallet session (connected address)
pub mod wallet;

// Subscriptions
/// Subscription registry, aggregation rounds and scheduling
pub mod subscription;

// State & presentation
/// Application state store fed by aggregation rounds
pub mod state;
/// Human-readable amounts, APY and countdowns
pub mod format;

// Observability
/// Metrics facade (no-op without the `observability` feature)
pub mod metrics;

pub use multicall::{BatchExecutor, Multicall};
pub use pools::{PoolCatalog, PoolDescriptor, PoolStatus};
pub use settings::Settings;
pub use state::{StakeState, StakeStore, StateUpdate};
pub use subscription::{
    Metric, MetricFlags, SubscriptionError, SubscriptionHandle, Subscriptions,
};
pub use wallet::WalletSession;
