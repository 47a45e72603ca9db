//! C8 — `run / stop / teardown`, migration/abort signal handling, state
//! persistence, and the periodic status logger of `SPEC_FULL.md` §4.9.
//! Grounded on the startup/shutdown sequencing of `crawl_engine/orchestrator.rs`'s
//! `crawl_pages` (enqueue → spawn workers → drain → teardown) and the
//! supervisor-task idiom for signal handling already present in the corpus's
//! `runtime` module (a dedicated task listening on `tokio::signal` alongside
//! the main work loop, rather than checking signals inline).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::events::{SchedulerEvent, SchedulerEventBus};
use crate::model::Request;
use crate::scheduler::autoscaled_pool::{AutoscaledPool, PoolOutcome, PoolPredicates};
use crate::scheduler::errors::SchedulerError;
use crate::scheduler::pipeline::{AttemptOutcome, TaskPipeline};
use crate::scheduler::request_manager::RequestManager;
use crate::scheduler::session_pool::SessionPool;
use crate::scheduler::statistics::{Statistics, StatisticsSnapshot};
use crate::storage::traits::{KeyValueStore, StatusLevel, StorageClient};

/// Fixed pause grace during migration/interrupt handling (`SPEC_FULL.md` §5).
const MIGRATION_PAUSE_GRACE: Duration = Duration::from_secs(20);

/// Process-wide tally of crawlers sharing the default `useState` key
/// (`SPEC_FULL.md` §4.8, §9 "Global warnings"). A crawler constructed with an
/// explicit `id` never touches this counter since its state is isolated.
static DEFAULT_STATE_PARTICIPANTS: AtomicUsize = AtomicUsize::new(0);
static DEFAULT_STATE_WARNED: AtomicBool = AtomicBool::new(false);

fn register_shared_state_participant(crawler_id: Option<&str>) {
    if crawler_id.is_some() {
        return;
    }
    let participants = DEFAULT_STATE_PARTICIPANTS.fetch_add(1, Ordering::SeqCst) + 1;
    if participants > 1 && !DEFAULT_STATE_WARNED.swap(true, Ordering::SeqCst) {
        warn!(
            participants,
            "multiple crawlers are sharing the default useState key; pass an explicit `id` to isolate state"
        );
    }
}

/// Result of a completed `run()`: the final statistics snapshot plus what the
/// underlying pool drain reported.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub stats: StatisticsSnapshot,
    pub pool_outcome: PoolOutcome,
}

/// Owns a single crawl run end to end: wires C1-C7 together behind
/// `AutoscaledPool::run`, and is the only component that calls
/// `tokio::signal`/`SchedulerEventBus` directly.
pub struct LifecycleController {
    config: Arc<SchedulerConfig>,
    request_manager: Arc<RequestManager>,
    session_pool: Option<Arc<SessionPool>>,
    pipeline: Arc<TaskPipeline>,
    pool: Arc<AutoscaledPool>,
    statistics: Arc<Statistics>,
    storage_client: Arc<dyn StorageClient>,
    kv_store: Arc<dyn KeyValueStore>,
    event_bus: Arc<SchedulerEventBus>,
    running: AtomicBool,
    purged: AtomicBool,
    /// Set the first time `run()` returns, so a `purgeRequestQueue` reset
    /// only ever applies starting from the second run, never the first
    /// (`SPEC_FULL.md` §4.9, step 2).
    has_run_before: AtomicBool,
    fatal_error: Mutex<Option<SchedulerError>>,
}

impl LifecycleController {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<SchedulerConfig>,
        request_manager: Arc<RequestManager>,
        session_pool: Option<Arc<SessionPool>>,
        pipeline: Arc<TaskPipeline>,
        pool: Arc<AutoscaledPool>,
        statistics: Arc<Statistics>,
        storage_client: Arc<dyn StorageClient>,
        kv_store: Arc<dyn KeyValueStore>,
        event_bus: Arc<SchedulerEventBus>,
    ) -> Self {
        Self {
            config,
            request_manager,
            session_pool,
            pipeline,
            pool,
            statistics,
            storage_client,
            kv_store,
            event_bus,
            running: AtomicBool::new(false),
            purged: AtomicBool::new(false),
            has_run_before: AtomicBool::new(false),
            fatal_error: Mutex::new(None),
        }
    }

    /// Key under which the handled-count split is persisted, isolated per
    /// crawler `id` the same way `useState` is (`SPEC_FULL.md` §4.8).
    fn statistics_key(&self) -> String {
        match &self.config.id {
            Some(id) => format!("CRAWLEE_STATISTICS_{id}"),
            None => "CRAWLEE_STATISTICS".to_string(),
        }
    }

    /// Reads a previously persisted handled-count split, if any, and folds
    /// it into `self.statistics` (`SPEC_FULL.md` §4.8, "handledCount on
    /// restart equals the stored total").
    async fn restore_statistics(&self) {
        match self.kv_store.get_value(&self.statistics_key()).await {
            Ok(Some(value)) => {
                let finished = value
                    .get("requestsFinished")
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(0);
                let failed = value
                    .get("requestsFailed")
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(0);
                if finished > 0 || failed > 0 {
                    info!(finished, failed, "restoring statistics from persisted state");
                    self.statistics.restore(finished, failed);
                }
            }
            Ok(None) => {}
            Err(err) => warn!(%err, "failed to read persisted statistics"),
        }
    }

    /// Persists the current handled-count split so a later process can
    /// restore it via `restore_statistics`.
    async fn persist_statistics(&self) {
        let snapshot = self.statistics.snapshot();
        let value = serde_json::json!({
            "requestsFinished": snapshot.requests_finished,
            "requestsFailed": snapshot.requests_failed,
        });
        if let Err(err) = self.kv_store.set_value(&self.statistics_key(), value).await {
            warn!(%err, "failed to persist statistics state");
        }
    }

    /// `run(initialRequests?, options)` of `SPEC_FULL.md` §4.9.
    pub async fn run(self: &Arc<Self>, initial_requests: Vec<Request>) -> anyhow::Result<RunOutcome> {
        if self.running.swap(true, Ordering::SeqCst) {
            anyhow::bail!("crawler is already running");
        }

        register_shared_state_participant(self.config.id.as_deref());

        let is_rerun = self.has_run_before.swap(true, Ordering::SeqCst);
        if is_rerun && self.config.purge_request_queue {
            info!("purgeRequestQueue set, dropping and reopening the queue for this run");
            self.storage_client.purge().await?;
            self.statistics.reset();
            self.request_manager.reset_handled_count();
        } else {
            self.maybe_purge().await?;
            self.restore_statistics().await;
        }

        if !initial_requests.is_empty() {
            self.request_manager
                .add_requests(initial_requests, false, false)
                .await?;
        }

        let signal_task = tokio::spawn(Arc::clone(self).run_signal_supervisor());
        let status_task = tokio::spawn(Arc::clone(self).run_status_logger());

        let predicates = self.build_predicates();
        let pool_outcome = self.pool.run(predicates).await;

        signal_task.abort();
        status_task.abort();
        self.running.store(false, Ordering::SeqCst);

        self.teardown().await;

        let stats = self.statistics.snapshot();
        info!(
            finished = stats.requests_finished,
            failed = stats.requests_failed,
            top_errors = ?stats.top_error_fingerprints,
            "crawl run complete"
        );

        if let Some(error) = self.fatal_error.lock().take() {
            return Err(anyhow::anyhow!(error.verbose_message()));
        }

        Ok(RunOutcome { stats, pool_outcome })
    }

    /// `stop(msg?)`: pause then abort without killing in-flight tasks.
    pub async fn stop(&self, msg: Option<&str>) {
        if let Some(msg) = msg {
            info!(%msg, "stop requested");
        }
        self.pool
            .pause(wait_until_idle(&self.pool), MIGRATION_PAUSE_GRACE)
            .await;
        self.pool.abort();
    }

    /// `teardown()`: abort immediately, persist final state, release storage.
    pub async fn teardown(&self) {
        self.pool.abort();
        let _ = self.event_bus.publish(SchedulerEvent::persist_state(false));
        self.persist_statistics().await;

        if let Some(session_pool) = &self.session_pool {
            debug!(remaining_sessions = session_pool.len(), "session pool stopped");
        }

        let teardown_fut = self.storage_client.teardown();
        tokio::pin!(teardown_fut);
        match tokio::time::timeout(Duration::from_secs(1), &mut teardown_fut).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(%err, "storage teardown failed"),
            Err(_) => {
                warn!("still waiting for storage provider to tear down");
                if let Err(err) = teardown_fut.await {
                    warn!(%err, "storage teardown failed");
                }
            }
        }
    }

    async fn maybe_purge(&self) -> anyhow::Result<()> {
        if self.purged.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let skip_purge = std::env::var("CRAWLEE_PURGE_ON_START")
            .map(|v| v == "0")
            .unwrap_or(false);
        if skip_purge {
            info!("CRAWLEE_PURGE_ON_START=0, skipping default storage purge to allow resume");
            return Ok(());
        }
        self.storage_client.purge().await.map_err(Into::into)
    }

    /// Process-wide interrupt: pause (grace 20s) then abort. A second
    /// interrupt force-exits immediately. A `Migrating` event takes the same
    /// pause, then persists state before aborting.
    async fn run_signal_supervisor(self: Arc<Self>) {
        let mut events = self.event_bus.subscribe();
        let mut interrupts = 0u32;
        loop {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    if signal.is_err() {
                        continue;
                    }
                    interrupts += 1;
                    if interrupts >= 2 {
                        warn!("second interrupt received, forcing abort");
                        self.pool.abort();
                        break;
                    }
                    info!("interrupt received, pausing for graceful shutdown");
                    self.pool.pause(wait_until_idle(&self.pool), MIGRATION_PAUSE_GRACE).await;
                    self.pool.abort();
                    break;
                }
                event = events.recv() => {
                    match event {
                        Ok(SchedulerEvent::Migrating { .. }) => {
                            info!("migration signal received, pausing and persisting state");
                            self.pool.pause(wait_until_idle(&self.pool), MIGRATION_PAUSE_GRACE).await;
                            let _ = self.event_bus.publish(SchedulerEvent::persist_state(true));
                            self.pool.abort();
                            break;
                        }
                        Ok(SchedulerEvent::Aborting { .. }) => {
                            self.pool.abort();
                            break;
                        }
                        Ok(SchedulerEvent::PersistState { .. }) => {}
                        Err(_) => break,
                    }
                }
            }
        }
    }

    async fn run_status_logger(self: Arc<Self>) {
        let interval = Duration::from_secs(self.config.status_message_logging_interval_secs.max(1));
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            if self.pool.is_aborted() {
                break;
            }
            let snapshot = self.statistics.snapshot();
            let message = match &self.config.status_message_callback {
                Some(callback) => callback(&snapshot),
                None => self.statistics.default_status_message(),
            };
            let level = if snapshot.requests_failed > 0 {
                StatusLevel::Warning
            } else {
                StatusLevel::Info
            };
            if let Err(err) = self
                .storage_client
                .set_status_message(&message, level, false)
                .await
            {
                warn!(%err, "failed to publish status message");
            }
            info!(%message, "status");
        }
    }

    /// Wires the pool predicates to the request queue and `maxRequestsPerCrawl`
    /// cap, per `SPEC_FULL.md` §4.3 and §4.6.
    fn build_predicates(self: &Arc<Self>) -> PoolPredicates {
        let cap_logged = Arc::new(AtomicBool::new(false));

        let ready_controller = Arc::clone(self);
        let cap_logged_for_ready = Arc::clone(&cap_logged);
        let is_task_ready: Arc<dyn Fn() -> bool + Send + Sync> = Arc::new(move || {
            if let Some(max) = ready_controller.config.max_requests_per_crawl {
                if ready_controller.statistics.handled_count() >= max {
                    if !cap_logged_for_ready.swap(true, Ordering::Relaxed) {
                        info!(max_requests_per_crawl = max, "max requests per crawl reached");
                    }
                    return false;
                }
            }
            true
        });

        let finished_controller = Arc::clone(self);
        let is_finished: Arc<dyn Fn() -> bool + Send + Sync> = Arc::new(move || {
            if let Some(max) = finished_controller.config.max_requests_per_crawl {
                if finished_controller.statistics.handled_count() >= max {
                    // The cap always wins, even under `keepAlive`
                    // (`SPEC_FULL.md` §9 Open Question).
                    return true;
                }
            }
            if finished_controller.config.keep_alive {
                return false;
            }
            finished_controller.pipeline.is_probably_finished()
        });

        let next_controller = Arc::clone(self);
        let next_task = Arc::new(move || {
            let controller = Arc::clone(&next_controller);
            Some(Box::pin(async move {
                if let AttemptOutcome::Critical(error) = controller.pipeline.run_attempt().await {
                    error!(
                        kind = ?error.kind(),
                        message = %error.verbose_message(),
                        "critical error, aborting crawl"
                    );
                    *controller.fatal_error.lock() = Some(error);
                    controller.pool.abort();
                }
            }) as std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>)
        });

        PoolPredicates {
            is_task_ready,
            is_finished,
            next_task,
        }
    }
}

async fn wait_until_idle(pool: &AutoscaledPool) {
    while pool.in_flight() > 0 {
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
