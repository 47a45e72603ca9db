//! C7 — counts, retry histogram, error grouping/fingerprinting, and the
//! periodic status message. Grounded on the teacher's `ProgressReporter`
//! trait / `NoOpProgress` zero-cost pattern (`crawl_engine/progress.rs`) for
//! the status-message callback hook, and its atomic-counter style
//! (`orchestrator.rs`'s `Arc<AtomicUsize>` totals) for the counters
//! themselves.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::scheduler::errors::SchedulerError;

#[derive(Debug, Clone, Default)]
pub struct StatisticsSnapshot {
    pub requests_started: u64,
    pub requests_finished: u64,
    pub requests_failed: u64,
    pub retry_histogram: Vec<(u32, u64)>,
    pub elapsed: Duration,
    pub mean_handler_duration: Duration,
    pub top_error_fingerprints: Vec<(String, u64)>,
}

pub struct Statistics {
    requests_started: AtomicU64,
    requests_finished: AtomicU64,
    requests_failed: AtomicU64,
    retry_histogram: DashMap<u32, u64>,
    error_fingerprints: DashMap<String, u64>,
    total_handler_nanos: AtomicU64,
    handler_samples: AtomicU64,
    started_at: Instant,
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

impl Statistics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests_started: AtomicU64::new(0),
            requests_finished: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            retry_histogram: DashMap::new(),
            error_fingerprints: DashMap::new(),
            total_handler_nanos: AtomicU64::new(0),
            handler_samples: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Restores `handledCount` (and therefore the success/failure split)
    /// after a migration, per `SPEC_FULL.md` §4.8.
    #[must_use]
    pub fn restored(requests_finished: u64, requests_failed: u64) -> Self {
        let stats = Self::new();
        stats.restore(requests_finished, requests_failed);
        stats
    }

    /// Overwrites the finished/failed counters in place, for restoring
    /// persisted totals into a `Statistics` that other components already
    /// hold a shared handle to.
    pub fn restore(&self, requests_finished: u64, requests_failed: u64) {
        self.requests_finished
            .store(requests_finished, Ordering::Relaxed);
        self.requests_failed.store(requests_failed, Ordering::Relaxed);
    }

    /// Zeroes every counter and clears the retry/error-fingerprint tallies,
    /// for `purgeRequestQueue`'s "reset stats" step (`SPEC_FULL.md` §4.9).
    pub fn reset(&self) {
        self.requests_started.store(0, Ordering::Relaxed);
        self.requests_finished.store(0, Ordering::Relaxed);
        self.requests_failed.store(0, Ordering::Relaxed);
        self.total_handler_nanos.store(0, Ordering::Relaxed);
        self.handler_samples.store(0, Ordering::Relaxed);
        self.retry_histogram.clear();
        self.error_fingerprints.clear();
    }

    pub fn record_started(&self) {
        self.requests_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, retry_count: u32, handler_duration: Duration) {
        self.requests_finished.fetch_add(1, Ordering::Relaxed);
        *self.retry_histogram.entry(retry_count).or_insert(0) += 1;
        self.total_handler_nanos
            .fetch_add(handler_duration.as_nanos() as u64, Ordering::Relaxed);
        self.handler_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, error: &SchedulerError) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
        *self
            .error_fingerprints
            .entry(error.fingerprint())
            .or_insert(0) += 1;
    }

    #[must_use]
    pub fn handled_count(&self) -> u64 {
        self.requests_finished.load(Ordering::Relaxed) + self.requests_failed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot(&self) -> StatisticsSnapshot {
        let mut retry_histogram: Vec<(u32, u64)> = self
            .retry_histogram
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        retry_histogram.sort_by_key(|(bucket, _)| *bucket);

        let mut top_errors: Vec<(String, u64)> = self
            .error_fingerprints
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        top_errors.sort_by(|a, b| b.1.cmp(&a.1));
        top_errors.truncate(3);

        let samples = self.handler_samples.load(Ordering::Relaxed).max(1);
        let mean_handler_duration =
            Duration::from_nanos(self.total_handler_nanos.load(Ordering::Relaxed) / samples);

        StatisticsSnapshot {
            requests_started: self.requests_started.load(Ordering::Relaxed),
            requests_finished: self.requests_finished.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            retry_histogram,
            elapsed: self.started_at.elapsed(),
            mean_handler_duration,
            top_error_fingerprints: top_errors,
        }
    }

    /// The default "regular" vs. "problems" status line; callers may
    /// replace this entirely via `statusMessageCallback`.
    #[must_use]
    pub fn default_status_message(&self) -> String {
        let snapshot = self.snapshot();
        if snapshot.requests_failed > 0 {
            format!(
                "problems: {} finished, {} failed, {:.1}s elapsed",
                snapshot.requests_finished,
                snapshot.requests_failed,
                snapshot.elapsed.as_secs_f64()
            )
        } else {
            format!(
                "regular: {} finished, {:.1}s elapsed",
                snapshot.requests_finished,
                snapshot.elapsed.as_secs_f64()
            )
        }
    }
}
