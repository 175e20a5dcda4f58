//! Bounded parallel fan-out for synchronization units.
//!
//! [`BatchExecutor`] runs one closure per item on a dedicated rayon pool and provides:
//!
//! - Results in input order
//! - A limit on units in flight on top of the thread count
//! - Real-time metrics + observer hooks for monitoring

mod observer;
mod semaphore;

use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use rayon::ThreadPool;
use rayon::ThreadPoolBuilder;

pub use observer::{
    ExecutionEvent, ExecutionMetrics, ExecutionMetricsSnapshot, ExecutionObserver, TracingExecutionObserver,
};

use semaphore::Semaphore;

/// Configuration for the [`BatchExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Number of worker threads.
    ///
    /// If `None`, uses the platform's available parallelism.
    pub num_threads: Option<usize>,
    /// Upper bound on concurrently executing units.
    pub max_in_flight_units: usize,
    /// Descriptors per chunk for full-catalog runs.
    pub chunk_size: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        let n = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self {
            num_threads: Some(n),
            max_in_flight_units: n.max(1),
            chunk_size: crate::config::DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Runs independent units in parallel with bounded concurrency.
pub struct BatchExecutor {
    pool: ThreadPool,
    opts: ExecutionOptions,
    observer: Option<Arc<dyn ExecutionObserver>>,
    metrics: Arc<ExecutionMetrics>,
}

impl BatchExecutor {
    /// Create a new executor with the given options.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size == 0`, `max_in_flight_units == 0`, `num_threads == Some(0)`, or the
    /// thread pool cannot be built.
    pub fn new(opts: ExecutionOptions) -> Self {
        assert!(opts.chunk_size > 0, "chunk_size must be > 0");
        assert!(
            opts.max_in_flight_units > 0,
            "max_in_flight_units must be > 0"
        );
        if let Some(n) = opts.num_threads {
            assert!(n > 0, "num_threads must be > 0 when set");
        }

        let n_threads = opts
            .num_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1);

        let pool = ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .thread_name(|i| format!("sync-worker-{i}"))
            .build()
            .expect("failed to build rayon thread pool");

        Self {
            pool,
            opts,
            observer: None,
            metrics: Arc::new(ExecutionMetrics::new()),
        }
    }

    /// Attach an observer for execution events.
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Get a handle to real-time execution metrics.
    pub fn metrics(&self) -> Arc<ExecutionMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.opts
    }

    /// Run `unit` for every item, at most `max_in_flight_units` at a time.
    ///
    /// Results are returned in input order. `unit` receives the item's index.
    pub fn run_units<T, R, F>(&self, items: &[T], unit: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(usize, &T) -> R + Send + Sync,
    {
        self.pool.install(|| self.run_units_impl(items, &unit))
    }

    /// Run `f` for every item without throttling or metrics. For cheap parallel lookups.
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Send + Sync,
    {
        self.pool.install(|| items.par_iter().map(&f).collect())
    }

    fn run_units_impl<T, R>(&self, items: &[T], unit: &(dyn Fn(usize, &T) -> R + Send + Sync)) -> Vec<R>
    where
        T: Sync,
        R: Send,
    {
        let start = Instant::now();
        self.metrics.begin_run();
        self.emit(ExecutionEvent::RunStarted { units: items.len() });

        let sem = Semaphore::new(self.opts.max_in_flight_units);
        let out: Vec<R> = items
            .par_iter()
            .enumerate()
            .map(|(index, item)| {
                let (_permit, waited) = sem.acquire();
                if waited > Duration::ZERO {
                    self.metrics.on_throttle_wait(waited);
                    self.emit(ExecutionEvent::ThrottleWaited { duration: waited });
                }

                self.metrics.on_unit_start();
                self.emit(ExecutionEvent::UnitStarted { index });
                let unit_start = Instant::now();

                let result = unit(index, item);

                self.emit(ExecutionEvent::UnitFinished {
                    index,
                    elapsed: unit_start.elapsed(),
                });
                self.metrics.on_unit_end();
                result
            })
            .collect();

        self.metrics.end_run(start.elapsed());
        self.emit(ExecutionEvent::RunFinished {
            elapsed: start.elapsed(),
            metrics: self.metrics.snapshot(),
        });
        out
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(obs) = &self.observer {
            obs.on_event(&event);
        }
    }
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::new(ExecutionOptions::default())
    }
}

/// Split `len` items into consecutive ranges of at most `chunk_size`.
pub fn chunk_ranges(len: usize, chunk_size: usize) -> Vec<Range<usize>> {
    if len == 0 || chunk_size == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(len.div_ceil(chunk_size));
    let mut start = 0usize;
    while start < len {
        let end = (start + chunk_size).min(len);
        out.push(start..end);
        start = end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{chunk_ranges, BatchExecutor, ExecutionOptions};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::execution::{ExecutionEvent, ExecutionObserver};

    fn options(threads: usize, in_flight: usize) -> ExecutionOptions {
        ExecutionOptions {
            num_threads: Some(threads),
            max_in_flight_units: in_flight,
            chunk_size: 10,
        }
    }

    #[test]
    fn run_units_keeps_input_order_and_runs_concurrently() {
        let items: Vec<usize> = (0..64).collect();
        let executor = BatchExecutor::new(options(4, 4));

        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));
        let (a, m) = (Arc::clone(&active), Arc::clone(&max_active));

        let out = executor.run_units(&items, move |index, item| {
            let now = a.fetch_add(1, Ordering::SeqCst) + 1;
            m.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(2));
            a.fetch_sub(1, Ordering::SeqCst);
            (index, item * 2)
        });

        assert_eq!(out.len(), items.len());
        for (i, (index, doubled)) in out.iter().enumerate() {
            assert_eq!(*index, i);
            assert_eq!(*doubled, i * 2);
        }
        assert!(max_active.load(Ordering::SeqCst) > 1);
    }

    struct ConcurrencyObserver {
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl ExecutionObserver for ConcurrencyObserver {
        fn on_event(&self, event: &ExecutionEvent) {
            match event {
                ExecutionEvent::UnitStarted { .. } => {
                    let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                    self.max_active.fetch_max(now, Ordering::SeqCst);
                }
                ExecutionEvent::UnitFinished { .. } => {
                    let _ = self.active.fetch_sub(1, Ordering::SeqCst);
                }
                _ => {}
            }
        }
    }

    #[test]
    fn max_in_flight_units_throttles_concurrency() {
        let items: Vec<usize> = (0..40).collect();
        let observer = Arc::new(ConcurrencyObserver {
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        });
        let obs_trait: Arc<dyn ExecutionObserver> = observer.clone();
        let executor = BatchExecutor::new(options(4, 1)).with_observer(obs_trait);

        let out = executor.run_units(&items, |_, _| std::thread::sleep(Duration::from_millis(1)));

        assert_eq!(out.len(), items.len());
        assert_eq!(observer.max_active.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn metrics_are_available_after_run() {
        let items: Vec<usize> = (0..30).collect();
        let executor = BatchExecutor::new(options(4, 1));
        let metrics = executor.metrics();

        executor.run_units(&items, |_, _| std::thread::sleep(Duration::from_millis(2)));

        let snap = metrics.snapshot();
        assert_eq!(snap.units_started, items.len() as u64);
        assert_eq!(snap.units_finished, items.len() as u64);
        assert_eq!(snap.max_active_units, 1);
        assert!(snap.throttle_wait > Duration::ZERO);
        assert!(snap.elapsed.is_some());
    }

    #[test]
    fn chunk_ranges_cover_everything() {
        assert_eq!(chunk_ranges(25, 10), vec![0..10, 10..20, 20..25]);
        assert!(chunk_ranges(0, 10).is_empty());
        assert_eq!(chunk_ranges(3, 10), vec![0..3]);
    }

    #[test]
    #[should_panic(expected = "max_in_flight_units must be > 0")]
    fn zero_in_flight_panics() {
        let _ = BatchExecutor::new(options(1, 0));
    }
}
