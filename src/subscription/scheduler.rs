//! Debounce/throttle scheduling of aggregation rounds.
//!
//! Update requests pass two stages before a round runs:
//!
//! 1. **Debounce** – every request restarts a single timer; only a request
//!    that is not followed by another within `debounce` reaches stage 2.
//! 2. **Throttle** – a round runs at most once per `min_update_delay`.
//!    Early requests schedule one deferred retry for the remaining wait,
//!    replacing any deferred retry already pending.
//!
//! `run_now` bypasses both stages.

use crate::metrics;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);
pub const DEFAULT_MIN_UPDATE_DELAY: Duration = Duration::from_millis(10_000);
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(30_000);

/// The expensive operation being scheduled.
#[async_trait]
pub trait RoundRunner: Send + Sync + 'static {
    async fn run_round(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub debounce: Duration,
    pub min_update_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            min_update_delay: DEFAULT_MIN_UPDATE_DELAY,
        }
    }
}

/// What the throttle stage did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Round started immediately
    RunNow,
    /// Single deferred retry scheduled after the given wait
    Deferred(Duration),
}

/// A cancellable timer slot. `generation` tells a fired timer whether it is
/// still the current one or has been superseded.
#[derive(Default)]
struct TimerSlot {
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

impl TimerSlot {
    fn replace(&mut self, handle: JoinHandle<()>) {
        self.clear();
        self.handle = Some(handle);
    }

    fn clear(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Clears without a replacement. A timer already past its sleep and
    /// waiting on the lock cannot be aborted, so its generation is retired.
    fn cancel(&mut self) {
        self.clear();
        self.next_generation();
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Called by a fired timer; false when it was superseded meanwhile.
    fn claim(&mut self, generation: u64) -> bool {
        if self.generation != generation {
            return false;
        }
        // Detach rather than abort: the caller is that very task.
        self.handle.take();
        true
    }

    fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

#[derive(Default)]
struct ThrottleState {
    last_run: Option<Instant>,
    timer: TimerSlot,
}

struct Inner {
    config: SchedulerConfig,
    runner: Arc<dyn RoundRunner>,
    debounce: Mutex<TimerSlot>,
    throttle: Mutex<ThrottleState>,
}

/// Owns the debounce and throttle timers of one application instance.
///
/// Cheap to clone; clones share timers. Must be used from within a tokio
/// runtime.
#[derive(Clone)]
pub struct UpdateScheduler {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl UpdateScheduler {
    pub fn new(runner: Arc<dyn RoundRunner>, config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                runner,
                debounce: Mutex::new(TimerSlot::default()),
                throttle: Mutex::new(ThrottleState::default()),
            }),
        }
    }

    pub fn config(&self) -> SchedulerConfig {
        self.inner.config
    }

    /// Debounce stage: (re)starts the debounce timer.
    pub fn request_update(&self) {
        metrics::increment_scheduler_request("debounce");

        let mut slot = lock(&self.inner.debounce);
        let generation = slot.next_generation();
        let scheduler = self.clone();
        let deadline = Instant::now() + self.inner.config.debounce;

        slot.replace(tokio::spawn(async move {
            sleep_until(deadline).await;
            if !lock(&scheduler.inner.debounce).claim(generation) {
                return;
            }
            debug!("debounce -> throttle");
            scheduler.throttle();
        }));
    }

    /// Throttle stage.
    pub fn throttle(&self) -> ThrottleDecision {
        metrics::increment_scheduler_request("throttle");
        let mut state = lock(&self.inner.throttle);
        self.throttle_locked(&mut state)
    }

    fn throttle_locked(&self, state: &mut ThrottleState) -> ThrottleDecision {
        let now = Instant::now();
        state.timer.clear();

        let min_delay = self.inner.config.min_update_delay;
        let since_last = state.last_run.map(|last| now.saturating_duration_since(last));

        match since_last {
            Some(elapsed) if elapsed < min_delay => {
                let wait = min_delay - elapsed;
                debug!(elapsed_ms = elapsed.as_millis() as u64, "throttling");

                let generation = state.timer.next_generation();
                let scheduler = self.clone();
                let deadline = now + wait;
                state.timer.replace(tokio::spawn(async move {
                    sleep_until(deadline).await;
                    let mut state = lock(&scheduler.inner.throttle);
                    if state.timer.claim(generation) {
                        scheduler.throttle_locked(&mut state);
                    }
                }));
                ThrottleDecision::Deferred(wait)
            }
            _ => {
                state.timer.cancel();
                state.last_run = Some(now);
                debug!("throttle -> round");
                self.spawn_round();
                ThrottleDecision::RunNow
            }
        }
    }

    /// Runs a round right away, bypassing debounce and throttle.
    pub fn run_now(&self) -> JoinHandle<()> {
        metrics::increment_scheduler_request("immediate");
        self.spawn_round()
    }

    fn spawn_round(&self) -> JoinHandle<()> {
        let runner = self.inner.runner.clone();
        tokio::spawn(async move { runner.run_round().await })
    }

    pub fn has_pending_debounce(&self) -> bool {
        lock(&self.inner.debounce).is_pending()
    }

    pub fn has_pending_deferred(&self) -> bool {
        lock(&self.inner.throttle).timer.is_pending()
    }

    pub fn last_run(&self) -> Option<Instant> {
        lock(&self.inner.throttle).last_run
    }

    /// Drops all pending timers.
    pub fn cancel(&self) {
        lock(&self.inner.debounce).cancel();
        lock(&self.inner.throttle).timer.cancel();
    }
}
