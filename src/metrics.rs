// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
    increment_counter, Unit,
};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
pub enum Unit {
    Count,
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! increment_counter {
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
use crate::{
    describe_counter, describe_gauge, describe_histogram, gauge, histogram,
    increment_counter,
};

/// Initializes the descriptions for all the metrics in the application.
/// This should be called once at startup.
pub fn describe_metrics() {
    describe_counter!(
        "launchpool_rounds_total",
        Unit::Count,
        "Aggregation rounds, labeled by outcome (executed, skipped, failed)."
    );
    describe_counter!(
        "launchpool_dispatch_failures_total",
        Unit::Count,
        "Per-metric dispatch failures, labeled by metric."
    );
    describe_counter!(
        "launchpool_scheduler_requests_total",
        Unit::Count,
        "Update requests entering the scheduler, labeled by stage."
    );
    describe_gauge!(
        "launchpool_active_subscriptions",
        "Number of (pool, metric) pairs with a positive reference count."
    );
    describe_histogram!(
        "launchpool_multicall_batch_size",
        "Number of calls per aggregate request."
    );
    describe_histogram!(
        "launchpool_round_duration_ms",
        "Wall time of an executed aggregation round in milliseconds."
    );
}

pub fn record_multicall_batch_size(size: f64) {
    histogram!("launchpool_multicall_batch_size", size);
}

pub fn record_round_duration_ms(ms: f64) {
    histogram!("launchpool_round_duration_ms", ms);
}

pub fn increment_round(outcome: &'static str) {
    increment_counter!("launchpool_rounds_total", "outcome" => outcome);
}

pub fn increment_dispatch_failure(metric: &'static str) {
    increment_counter!("launchpool_dispatch_failures_total", "metric" => metric);
}

pub fn increment_scheduler_request(stage: &'static str) {
    increment_counter!("launchpool_scheduler_requests_total", "stage" => stage);
}

pub fn set_active_subscriptions(count: f64) {
    gauge!("launchpool_active_subscriptions", count);
}
