//! C3 — bounded-concurrency task runner with min/max concurrency, optional
//! `maxTasksPerMinute` pacing, and pause/abort/resume.
//!
//! Grounded on two teacher shapes: the background scaler loop adjusting a
//! target pool size in `browser_pool/mod.rs` (`AtomicUsize`/`AtomicBool`
//! counters, `tokio::time::interval`), and the `FuturesUnordered` +
//! `Semaphore`-gated concurrent draining loop in
//! `crawl_engine/orchestrator.rs`.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::task::AbortHandle;
use tokio::time::Instant as TokioInstant;
use tracing::{info, warn};

use crate::scheduler::rate_limiter::{RateLimitDecision, TaskRateLimiter};

type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Predicates the pool consults before starting and between tasks, supplied
/// by the Lifecycle Controller / Task Pipeline.
pub struct PoolPredicates {
    pub is_task_ready: Arc<dyn Fn() -> bool + Send + Sync>,
    pub is_finished: Arc<dyn Fn() -> bool + Send + Sync>,
    /// Produces the next unit of work to run. Returning `None` means no work
    /// is immediately available (e.g. the pacer deferred the only ready
    /// request); the pool treats this as a no-op tick rather than an error.
    pub next_task: Arc<dyn Fn() -> Option<TaskFuture> + Send + Sync>,
}

#[derive(Debug, Clone, Copy)]
pub struct PoolOutcome {
    pub completed: usize,
    pub incomplete_on_pause: usize,
}

pub struct AutoscaledPool {
    min_concurrency: usize,
    max_concurrency: usize,
    target_concurrency: AtomicUsize,
    busy_count: AtomicUsize,
    rate_limiter: Option<TaskRateLimiter>,
    paused: AtomicBool,
    aborted: AtomicBool,
    consecutive_system_failures: AtomicUsize,
}

impl AutoscaledPool {
    /// `keepAlive` is not a pool-level parameter here: forcing
    /// `isFinishedFunction` to `false` while a `maxRequestsPerCrawl` cap
    /// still dominates (`SPEC_FULL.md` §9 Open Question) requires knowing
    /// both facts at once, so that decision is owned entirely by whichever
    /// `PoolPredicates::is_finished` the caller supplies (see
    /// `LifecycleController::build_predicates`) rather than being
    /// reapplied here as a second, conflicting gate.
    #[must_use]
    pub fn new(min_concurrency: usize, max_concurrency: usize, max_tasks_per_minute: Option<u32>) -> Self {
        Self {
            min_concurrency,
            max_concurrency,
            target_concurrency: AtomicUsize::new(min_concurrency.max(1)),
            busy_count: AtomicUsize::new(0),
            rate_limiter: max_tasks_per_minute.map(TaskRateLimiter::new),
            paused: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
            consecutive_system_failures: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn current_concurrency(&self) -> usize {
        self.target_concurrency.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.busy_count.load(Ordering::Relaxed)
    }

    /// Called by the pipeline after a task completes without a system-level
    /// error; nudges concurrency up toward `max` when the pool has been
    /// running at its current target (saturated) rather than on a fixed
    /// schedule — the load-ratio proxy described in `SPEC_FULL.md` §4.3.
    pub fn report_task_saturated(&self) {
        self.consecutive_system_failures.store(0, Ordering::Relaxed);
        let target = self.target_concurrency.load(Ordering::Relaxed);
        if target < self.max_concurrency && self.busy_count.load(Ordering::Relaxed) >= target {
            self.target_concurrency.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Called by the pipeline after a system-level (non-user-handler)
    /// failure; repeated failures back concurrency off toward `min`.
    pub fn report_system_failure(&self) {
        let failures = self.consecutive_system_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= 3 {
            let target = self.target_concurrency.load(Ordering::Relaxed);
            if target > self.min_concurrency {
                self.target_concurrency.fetch_sub(1, Ordering::Relaxed);
            }
            self.consecutive_system_failures.store(0, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }

    /// `run()`: blocks until `predicates.is_finished()` (or `keepAlive`
    /// suppresses that check and the pool is stopped externally), draining
    /// up to `max_concurrency` concurrent tasks via a `FuturesUnordered`,
    /// matching the corpus's bounded-concurrency drain loop.
    pub async fn run(self: &Arc<Self>, predicates: PoolPredicates) -> PoolOutcome {
        let mut in_flight: FuturesUnordered<tokio::task::JoinHandle<()>> = FuturesUnordered::new();
        let mut handles: Vec<AbortHandle> = Vec::new();
        let mut completed = 0usize;

        loop {
            if self.aborted.load(Ordering::Relaxed) {
                break;
            }

            let finished = (predicates.is_finished)();
            if finished && in_flight.is_empty() {
                break;
            }

            let can_start = !self.is_paused()
                && !finished
                && self.busy_count.load(Ordering::Relaxed) < self.current_concurrency()
                && (predicates.is_task_ready)();

            if can_start {
                let rate_ok = match &self.rate_limiter {
                    Some(limiter) => matches!(limiter.try_consume(), RateLimitDecision::Allow),
                    None => true,
                };
                if rate_ok {
                    if let Some(task) = (predicates.next_task)() {
                        self.busy_count.fetch_add(1, Ordering::Relaxed);
                        let pool = Arc::clone(self);
                        let join = tokio::spawn(async move {
                            task.await;
                            pool.busy_count.fetch_sub(1, Ordering::Relaxed);
                        });
                        handles.push(join.abort_handle());
                        in_flight.push(join);
                        continue;
                    }
                }
            }

            tokio::select! {
                biased;
                Some(result) = in_flight.next() => {
                    if result.is_ok() {
                        completed += 1;
                    }
                }
                () = tokio::time::sleep(Duration::from_millis(5)) => {}
            }
        }

        let incomplete = in_flight.len();
        PoolOutcome {
            completed,
            incomplete_on_pause: incomplete,
        }
    }

    /// `pause(graceMs)`: stop admitting new tasks; wait up to `grace` for
    /// in-flight tasks to finish on their own. Returns `true` if every task
    /// drained in time.
    pub async fn pause(&self, in_flight_drained: impl Future<Output = ()>, grace: Duration) -> bool {
        self.paused.store(true, Ordering::Relaxed);
        let deadline = TokioInstant::now() + grace;
        tokio::select! {
            () = in_flight_drained => true,
            () = tokio::time::sleep_until(deadline) => {
                warn!("pause grace period elapsed with tasks still running");
                false
            }
        }
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    /// `abort()`: stop admitting new tasks and signal the run loop to exit
    /// without waiting for in-flight work.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
        info!("autoscaled pool aborted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;

    #[tokio::test]
    async fn happy_path_never_exceeds_max_concurrency() {
        let pool = Arc::new(AutoscaledPool::new(1, 2, None));
        let dispatched = Arc::new(StdAtomicUsize::new(0));
        let max_observed = Arc::new(StdAtomicUsize::new(0));
        let current = Arc::new(StdAtomicUsize::new(0));
        let total = Arc::new(StdAtomicUsize::new(3));

        let dispatched_clone = dispatched.clone();
        let total_clone = total.clone();
        let is_finished = Arc::new(move || dispatched_clone.load(Ordering::Relaxed) >= total_clone.load(Ordering::Relaxed));
        let is_task_ready = Arc::new(|| true);

        let dispatched_clone2 = dispatched.clone();
        let total_clone2 = total.clone();
        let current_clone = current.clone();
        let max_observed_clone = max_observed.clone();
        let next_task = Arc::new(move || -> Option<TaskFuture> {
            if dispatched_clone2.load(Ordering::Relaxed) >= total_clone2.load(Ordering::Relaxed) {
                return None;
            }
            dispatched_clone2.fetch_add(1, Ordering::Relaxed);
            let current = current_clone.clone();
            let max_observed = max_observed_clone.clone();
            Some(Box::pin(async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                max_observed.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                current.fetch_sub(1, Ordering::SeqCst);
            }) as TaskFuture)
        });

        // force target to max immediately for this test, since the scaler
        // otherwise only ramps up lazily via report_task_saturated.
        pool.target_concurrency.store(2, Ordering::Relaxed);

        let outcome = pool
            .run(PoolPredicates {
                is_task_ready,
                is_finished,
                next_task,
            })
            .await;

        assert_eq!(outcome.completed, 3);
        assert!(max_observed.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn report_system_failure_ramps_concurrency_down_after_three_failures() {
        let pool = AutoscaledPool::new(1, 4, None);
        pool.target_concurrency.store(4, Ordering::Relaxed);
        pool.report_system_failure();
        pool.report_system_failure();
        assert_eq!(pool.current_concurrency(), 4);
        pool.report_system_failure();
        assert_eq!(pool.current_concurrency(), 3);
    }
}
