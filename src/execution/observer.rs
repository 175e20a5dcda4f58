use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tracing::debug;

/// Execution events emitted by the [`super::BatchExecutor`].
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted { units: usize },
    ThrottleWaited { duration: Duration },
    UnitStarted { index: usize },
    UnitFinished { index: usize, elapsed: Duration },
    RunFinished {
        elapsed: Duration,
        metrics: ExecutionMetricsSnapshot,
    },
}

/// Observer hook for execution events.
pub trait ExecutionObserver: Send + Sync {
    fn on_event(&self, event: &ExecutionEvent);
}

/// Forwards execution events to `tracing` at debug level.
#[derive(Debug, Default)]
pub struct TracingExecutionObserver;

impl ExecutionObserver for TracingExecutionObserver {
    fn on_event(&self, event: &ExecutionEvent) {
        debug!(?event, "execution event");
    }
}

/// Real-time metrics for a batch run.
///
/// The executor updates these counters during execution; callers can snapshot them at any time.
pub struct ExecutionMetrics {
    run_id: AtomicU64,
    elapsed_ns: AtomicU64,

    units_started: AtomicU64,
    units_finished: AtomicU64,
    throttle_wait_ns: AtomicU64,

    active_units: AtomicUsize,
    max_active_units: AtomicUsize,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self {
            run_id: AtomicU64::new(0),
            elapsed_ns: AtomicU64::new(0),
            units_started: AtomicU64::new(0),
            units_finished: AtomicU64::new(0),
            throttle_wait_ns: AtomicU64::new(0),
            active_units: AtomicUsize::new(0),
            max_active_units: AtomicUsize::new(0),
        }
    }

    pub fn begin_run(&self) {
        let _ = self.run_id.fetch_add(1, Ordering::SeqCst);
        self.elapsed_ns.store(0, Ordering::SeqCst);
        self.units_started.store(0, Ordering::SeqCst);
        self.units_finished.store(0, Ordering::SeqCst);
        self.throttle_wait_ns.store(0, Ordering::SeqCst);
        self.active_units.store(0, Ordering::SeqCst);
        self.max_active_units.store(0, Ordering::SeqCst);
    }

    pub fn end_run(&self, elapsed: Duration) {
        self.elapsed_ns.store(saturating_nanos(elapsed), Ordering::SeqCst);
    }

    pub fn on_unit_start(&self) {
        let _ = self.units_started.fetch_add(1, Ordering::SeqCst);
        let now = self.active_units.fetch_add(1, Ordering::SeqCst) + 1;
        update_max_usize(&self.max_active_units, now);
    }

    pub fn on_unit_end(&self) {
        let _ = self.units_finished.fetch_add(1, Ordering::SeqCst);
        let _ = self.active_units.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn on_throttle_wait(&self, d: Duration) {
        let _ = self.throttle_wait_ns.fetch_add(saturating_nanos(d), Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ExecutionMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        ExecutionMetricsSnapshot {
            run_id: self.run_id.load(Ordering::SeqCst),
            elapsed: (elapsed_ns > 0).then(|| Duration::from_nanos(elapsed_ns)),
            units_started: self.units_started.load(Ordering::SeqCst),
            units_finished: self.units_finished.load(Ordering::SeqCst),
            throttle_wait: Duration::from_nanos(self.throttle_wait_ns.load(Ordering::SeqCst)),
            max_active_units: self.max_active_units.load(Ordering::SeqCst),
        }
    }
}

impl Default for ExecutionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn saturating_nanos(d: Duration) -> u64 {
    d.as_nanos().min(u64::MAX as u128) as u64
}

fn update_max_usize(dst: &AtomicUsize, now: usize) {
    let _ = dst.fetch_max(now, Ordering::SeqCst);
}

/// Immutable snapshot of [`ExecutionMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionMetricsSnapshot {
    pub run_id: u64,
    pub elapsed: Option<Duration>,
    pub units_started: u64,
    pub units_finished: u64,
    pub throttle_wait: Duration,
    pub max_active_units: usize,
}

impl fmt::Display for ExecutionMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_id={}, units={}/{}, max_active_units={}, throttle_wait={:?}, elapsed={:?}",
            self.run_id,
            self.units_finished,
            self.units_started,
            self.max_active_units,
            self.throttle_wait,
            self.elapsed
        )
    }
}
