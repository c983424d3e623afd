//! Reference-counted registry of (pool, metric) subscriptions.

use super::catalog::Metric;
use crate::metrics;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Set of metrics a subscriber is interested in.
///
/// Built from `(metric, wanted)` flags the way UI components declare them;
/// metrics flagged `false` are simply not part of the set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricFlags(BTreeSet<Metric>);

impl MetricFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every metric in the catalog (pool detail page)
    pub fn all() -> Self {
        Metric::ALL.into_iter().collect()
    }

    pub fn with(mut self, metric: Metric, enabled: bool) -> Self {
        self.set(metric, enabled);
        self
    }

    pub fn set(&mut self, metric: Metric, enabled: bool) {
        if enabled {
            self.0.insert(metric);
        } else {
            self.0.remove(&metric);
        }
    }

    pub fn contains(&self, metric: Metric) -> bool {
        self.0.contains(&metric)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Metric> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Metric> for MetricFlags {
    fn from_iter<I: IntoIterator<Item = Metric>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl FromIterator<(Metric, bool)> for MetricFlags {
    fn from_iter<I: IntoIterator<Item = (Metric, bool)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .filter(|(_, enabled)| *enabled)
                .map(|(metric, _)| metric)
                .collect(),
        )
    }
}

/// Point-in-time copy of all positive reference counts.
///
/// Rounds resolve demand from a snapshot; subscriptions that change after it
/// was taken are picked up by the next round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    counts: BTreeMap<String, BTreeMap<Metric, u32>>,
}

impl RegistrySnapshot {
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn count(&self, pool_id: &str, metric: Metric) -> u32 {
        self.counts
            .get(pool_id)
            .and_then(|metrics| metrics.get(&metric))
            .copied()
            .unwrap_or(0)
    }

    /// All (pool, metric) pairs with at least one subscriber
    pub fn active(&self) -> impl Iterator<Item = (&str, Metric)> + '_ {
        self.counts.iter().flat_map(|(pool_id, metrics)| {
            metrics.keys().map(move |metric| (pool_id.as_str(), *metric))
        })
    }
}

impl<S: Into<String>> FromIterator<(S, Metric, u32)> for RegistrySnapshot {
    fn from_iter<I: IntoIterator<Item = (S, Metric, u32)>>(iter: I) -> Self {
        let mut counts: BTreeMap<String, BTreeMap<Metric, u32>> = BTreeMap::new();
        for (pool_id, metric, count) in iter {
            if count > 0 {
                counts.entry(pool_id.into()).or_default().insert(metric, count);
            }
        }
        Self { counts }
    }
}

/// Reference counts of active subscribers per (pool, metric).
///
/// Entries are created lazily on first subscribe and are only ever
/// decremented, never removed. Counts never go below zero.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    counts: Mutex<HashMap<String, HashMap<Metric, u32>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, HashMap<Metric, u32>>> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Increments every flagged metric for `pool_id` by one.
    ///
    /// Returns `false` (and changes nothing) when no metric is flagged.
    pub fn subscribe(&self, pool_id: &str, flags: &MetricFlags) -> bool {
        if flags.is_empty() {
            return false;
        }

        let mut counts = self.lock();
        let pool = counts.entry(pool_id.to_string()).or_default();
        for metric in flags.iter() {
            *pool.entry(metric).or_insert(0) += 1;
        }
        debug!(pool_id, metrics = flags.len(), "subscribed");
        metrics::set_active_subscriptions(active_pairs(&counts) as f64);
        true
    }

    /// Decrements every flagged metric for `pool_id` by one, clamping at zero.
    pub fn unsubscribe(&self, pool_id: &str, flags: &MetricFlags) {
        if flags.is_empty() {
            return;
        }

        let mut counts = self.lock();
        let pool = counts.entry(pool_id.to_string()).or_default();
        for metric in flags.iter() {
            let count = pool.entry(metric).or_insert(0);
            if *count == 0 {
                warn!(pool_id, %metric, "unsubscribe without matching subscribe ignored");
                continue;
            }
            *count -= 1;
        }
        debug!(pool_id, metrics = flags.len(), "unsubscribed");
        metrics::set_active_subscriptions(active_pairs(&counts) as f64);
    }

    pub fn count(&self, pool_id: &str, metric: Metric) -> u32 {
        self.lock()
            .get(pool_id)
            .and_then(|metrics| metrics.get(&metric))
            .copied()
            .unwrap_or(0)
    }

    /// Number of (pool, metric) pairs with a positive count
    pub fn active_count(&self) -> usize {
        active_pairs(&self.lock())
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let counts = self.lock();
        counts
            .iter()
            .flat_map(|(pool_id, metrics)| {
                metrics
                    .iter()
                    .map(move |(metric, count)| (pool_id.clone(), *metric, *count))
            })
            .collect()
    }
}

fn active_pairs(counts: &HashMap<String, HashMap<Metric, u32>>) -> usize {
    counts
        .values()
        .map(|metrics| metrics.values().filter(|&&count| count > 0).count())
        .sum()
}
