//! C6 — the per-request state machine: fetch → policy checks → user
//! handler → mark handled / retry / fail. Grounded on the overall attempt
//! flow of `crawl_engine/orchestrator.rs` (fetch → checks → handler →
//! outcome branch → cleanup) and the `FailureKind` classification idiom of
//! `crawl_engine/crawl_types.rs`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::SchedulerConfig;
use crate::model::context::ContextOps;
use crate::model::request::{RequestState, SkippedReason};
use crate::model::{CrawlingContext, Request, Session};
use crate::scheduler::autoscaled_pool::AutoscaledPool;
use crate::scheduler::domain_pacer::{DomainPacer, PacerDecision};
use crate::scheduler::errors::{can_retry, ErrorKind, SchedulerError};
use crate::scheduler::request_manager::RequestManager;
use crate::scheduler::robots_cache::RobotsCache;
use crate::scheduler::session_pool::SessionPool;
use crate::scheduler::statistics::Statistics;
use crate::storage::traits::{AddRequestsOptions, BatchAddResult, KeyValueStore};
use crate::storage::transport::{RequestTransport, TransportResponse};

/// Outcome of a single `run_attempt`, consumed by the Lifecycle Controller's
/// `isFinished`/logging and by the Autoscaled Pool's load-ratio scaler.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// Nothing to do this tick (empty queue, or the pacer deferred).
    NoOp,
    Done,
    Skipped(SkippedReason),
    Retried,
    Failed,
    /// A critical error must propagate out of the pool and terminate the run
    /// (`SPEC_FULL.md` §4.7).
    Critical(SchedulerError),
}

pub struct TaskPipeline {
    config: Arc<SchedulerConfig>,
    request_manager: Arc<RequestManager>,
    session_pool: Option<Arc<SessionPool>>,
    domain_pacer: Arc<DomainPacer>,
    robots_cache: Option<Arc<RobotsCache>>,
    statistics: Arc<Statistics>,
    transport: Arc<dyn RequestTransport>,
    kv_store: Arc<dyn KeyValueStore>,
    pool: Arc<AutoscaledPool>,
    /// Set whenever `fetchNext` last came back empty, cleared whenever it
    /// returns a request. A cheap, sync-readable liveness signal the
    /// Lifecycle Controller's `isFinishedFunction` consults instead of
    /// querying the (async) storage provider directly on every pool tick.
    queue_probably_empty: AtomicBool,
}

impl TaskPipeline {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<SchedulerConfig>,
        request_manager: Arc<RequestManager>,
        session_pool: Option<Arc<SessionPool>>,
        domain_pacer: Arc<DomainPacer>,
        robots_cache: Option<Arc<RobotsCache>>,
        statistics: Arc<Statistics>,
        transport: Arc<dyn RequestTransport>,
        kv_store: Arc<dyn KeyValueStore>,
        pool: Arc<AutoscaledPool>,
    ) -> Self {
        Self {
            config,
            request_manager,
            session_pool,
            domain_pacer,
            robots_cache,
            statistics,
            transport,
            kv_store,
            pool,
            queue_probably_empty: AtomicBool::new(false),
        }
    }

    /// Whether the last `fetchNext` came back empty. Consulted by the
    /// Lifecycle Controller, never by the pipeline itself.
    #[must_use]
    pub fn is_probably_finished(&self) -> bool {
        self.queue_probably_empty.load(Ordering::Relaxed)
    }

    /// One pass of the per-attempt sequence in `SPEC_FULL.md` §4.6.
    pub async fn run_attempt(self: &Arc<Self>) -> AttemptOutcome {
        let internal_timeout = Duration::from_secs(self.config.internal_timeout_secs());

        let fetched = tokio::time::timeout(internal_timeout, self.request_manager.fetch_next()).await;
        let request = match fetched {
            Ok(Ok(Some(request))) => {
                self.queue_probably_empty.store(false, Ordering::Relaxed);
                request
            }
            Ok(Ok(None)) => {
                self.queue_probably_empty.store(true, Ordering::Relaxed);
                return AttemptOutcome::NoOp;
            }
            Ok(Err(err)) => {
                self.pool.report_system_failure();
                return AttemptOutcome::Critical(SchedulerError::storage_unavailable(err.to_string()));
            }
            Err(_) => {
                self.pool.report_system_failure();
                return AttemptOutcome::Critical(SchedulerError::internal_timeout("fetchNext"));
            }
        };

        let domain = registrable_domain_of(&request.url);
        if let Some(domain) = &domain {
            if let PacerDecision::Defer(after) = self.domain_pacer.check(domain) {
                let _ = self.request_manager.reclaim(request, true).await;
                tokio::time::sleep(after.min(Duration::from_millis(50))).await;
                return AttemptOutcome::NoOp;
            }
        }

        if let Some(robots) = &self.robots_cache {
            if let RobotsTxtGate::Enabled { user_agent } = self.robots_gate() {
                if !robots.is_allowed(&request.url, &user_agent).await {
                    return self.skip(request, SkippedReason::RobotsTxt).await;
                }
            }
        }

        self.statistics.record_started();
        let started_at = Instant::now();

        let session = if self.config.use_session_pool {
            self.session_pool.as_ref().map(|pool| {
                let mut session = pool.get_session();
                session.mark_used();
                session
            })
        } else {
            None
        };

        let mut request = request;
        request.loaded_url = None;
        request.state = RequestState::RequestHandler;

        let ctx = CrawlingContext::new(request.clone(), session.clone(), self.clone());
        let loaded_url_handle = ctx.loaded_url_handle();
        let original_url = request.url.clone();
        let strategy = request.enqueue_strategy;

        let handler_timeout = Duration::from_secs(self.config.request_handler_timeout_secs);
        let handler_result = tokio::time::timeout(handler_timeout, (self.config.request_handler)(ctx)).await;

        let outcome = match handler_result {
            Ok(Ok(())) => {
                // Enqueue-strategy post-redirect check (`SPEC_FULL.md` §4.6).
                // `sendRequest` reports its final URL back through the
                // context's shared slot, since the handler owns the context
                // itself and the pipeline's own `request` never sees writes
                // the handler makes through it.
                request.loaded_url = loaded_url_handle.lock().clone();
                if let Some(strategy) = strategy {
                    let loaded = request.loaded_url.clone().unwrap_or_else(|| original_url.clone());
                    if !strategy.satisfied_by(&original_url, &loaded) {
                        return self.skip(request, SkippedReason::Redirect).await;
                    }
                }
                self.on_success(request, session, started_at).await
            }
            Ok(Err(err)) => {
                self.on_failure(request, session, classify(&err)).await
            }
            Err(_) => {
                self.on_failure(request, session, SchedulerError::handler_timeout("requestHandlerTimeoutSecs exceeded")).await
            }
        };
        outcome
    }

    fn robots_gate(&self) -> RobotsTxtGate {
        match &self.config.respect_robots_txt_file {
            crate::config::RobotsTxtOption::Disabled => RobotsTxtGate::Disabled,
            crate::config::RobotsTxtOption::Enabled { user_agent } => RobotsTxtGate::Enabled {
                user_agent: user_agent.clone(),
            },
        }
    }

    async fn skip(self: &Arc<Self>, mut request: Request, reason: SkippedReason) -> AttemptOutcome {
        request.mark_skipped(reason);
        self.report_skip(&request, reason);
        if let Err(err) = self.request_manager.mark_handled(request).await {
            warn!(%err, "failed to mark skipped request handled");
        }
        AttemptOutcome::Skipped(reason)
    }

    fn report_skip(&self, request: &Request, reason: SkippedReason) {
        info!(url = %request.url, reason = reason.as_str(), "request skipped");
        if let Some(callback) = &self.config.on_skipped_request {
            callback(request, reason);
        }
    }

    async fn on_success(
        self: &Arc<Self>,
        request: Request,
        session: Option<Session>,
        started_at: Instant,
    ) -> AttemptOutcome {
        let mut request = request;
        request.state = RequestState::Done;
        let retry_count = request.retry_count;

        if let Err(err) = self.request_manager.mark_handled(request).await {
            warn!(%err, "markHandled failed after successful attempt");
        }
        if let Some(mut session) = session {
            session.mark_good();
            if let Some(pool) = &self.session_pool {
                pool.return_session(session);
            }
        }
        self.statistics.record_success(retry_count, started_at.elapsed());
        self.pool.report_task_saturated();
        AttemptOutcome::Done
    }

    async fn on_failure(
        self: &Arc<Self>,
        mut request: Request,
        session: Option<Session>,
        error: SchedulerError,
    ) -> AttemptOutcome {
        request.error_messages.push(error.message.clone());

        if error.kind == ErrorKind::Critical {
            self.pool.report_system_failure();
            return AttemptOutcome::Critical(error);
        }

        let retryable = can_retry(
            &request,
            &error,
            self.config.max_request_retries,
            self.config.max_session_rotations,
        );

        if retryable {
            if let Some(handler) = &self.config.error_handler {
                let ctx = CrawlingContext::new(request.clone(), session.clone(), self.clone());
                if let Err(user_err) = handler(ctx, Arc::new(SchedulerError::user_handler_origin(error.message.clone()))).await {
                    warn!(%user_err, "user errorHandler raised");
                }
            }
            let mut session = session;
            if error.kind == ErrorKind::SessionError {
                request.session_rotation_count += 1;
                if let Some(session) = session.as_mut() {
                    session.retire();
                }
            }
            if let Some(session) = session {
                if let Some(pool) = &self.session_pool {
                    if session.retired {
                        pool.return_session(session);
                    } else {
                        let mut session = session;
                        session.mark_bad();
                        pool.return_session(session);
                    }
                }
            }
            if !request.no_retry {
                request.retry_count += 1;
                let forefront = request.forefront_requested();
                if let Err(err) = self.request_manager.reclaim(request, forefront).await {
                    warn!(%err, "reclaim after retryable failure failed");
                }
            }
            self.pool.report_task_saturated();
            AttemptOutcome::Retried
        } else {
            self.statistics.record_failure(&error);
            request.state = RequestState::Error;

            // Keep a copy of the session for the failed-request context
            // before handing the mutated (marked-bad) session back to the
            // pool, which is the sole mutator of the session catalog.
            let ctx_session = session.clone();
            if let Some(mut bad_session) = session {
                bad_session.mark_bad();
                if let Some(pool) = &self.session_pool {
                    pool.return_session(bad_session);
                }
            }

            if let Err(err) = self.request_manager.mark_handled(request.clone()).await {
                warn!(%err, "markHandled failed for terminal failure");
            }

            if let Some(handler) = &self.config.failed_request_handler {
                let ctx = CrawlingContext::new(request, ctx_session, self.clone());
                handler(ctx, Arc::new(error)).await;
            }

            self.pool.report_task_saturated();
            AttemptOutcome::Failed
        }
    }
}

enum RobotsTxtGate {
    Disabled,
    Enabled { user_agent: String },
}

/// Classifies a handler error into the taxonomy of `SPEC_FULL.md` §7,
/// generalizing the teacher's `FailureKind::classify` string-matching
/// heuristic over `anyhow::Error` chains.
fn classify(err: &anyhow::Error) -> SchedulerError {
    if let Some(scheduler_err) = err.downcast_ref::<SchedulerError>() {
        return SchedulerError::new(scheduler_err.kind, scheduler_err.message.clone());
    }
    let message = err.to_string();
    let lower = message.to_lowercase();
    let kind = if lower.contains("blocked") || lower.contains("captcha") || lower.contains("403") {
        ErrorKind::SessionError
    } else if lower.contains("timeout") {
        ErrorKind::InternalTimeout
    } else {
        ErrorKind::UserHandlerOrigin
    };
    SchedulerError::new(kind, message)
}

fn registrable_domain_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed.host_str().map(str::to_string)
}

#[async_trait]
impl ContextOps for TaskPipeline {
    async fn enqueue_links(
        &self,
        parent: &Request,
        urls: Vec<String>,
        forefront: bool,
    ) -> anyhow::Result<BatchAddResult> {
        let requests = urls.into_iter().map(Request::new).collect();
        self.add_requests(parent, requests, forefront).await
    }

    async fn add_requests(
        &self,
        parent: &Request,
        requests: Vec<Request>,
        forefront: bool,
    ) -> anyhow::Result<BatchAddResult> {
        let depth = parent.crawl_depth + 1;
        let mut ready = Vec::with_capacity(requests.len());
        for mut request in requests {
            request.crawl_depth = depth;
            if let Some(max_depth) = self.config.max_crawl_depth {
                if depth > max_depth {
                    request.mark_skipped(SkippedReason::Depth);
                    self.report_skip(&request, SkippedReason::Depth);
                    continue;
                }
            }
            ready.push(request);
        }

        if let Some(max) = self.config.max_requests_per_crawl {
            let handled = self.statistics.handled_count();
            let pending = self.request_manager.get_pending_count().await.unwrap_or(0);
            let remaining = max.saturating_sub(handled + pending) as usize;
            if ready.len() > remaining {
                let overflow = ready.split_off(remaining);
                for mut request in overflow {
                    request.mark_skipped(SkippedReason::Limit);
                    self.report_skip(&request, SkippedReason::Limit);
                }
            }
        }

        self.request_manager
            .add_requests(ready, forefront, false)
            .await
            .map_err(Into::into)
    }

    async fn push_data(&self, data: serde_json::Value) -> anyhow::Result<()> {
        // Dataset persistence is an excluded collaborator; the core only
        // guarantees the call is wired through to the configured store.
        self.kv_store
            .set_value(&format!("dataset:{}", uuid::Uuid::new_v4()), data)
            .await
            .map_err(Into::into)
    }

    async fn use_state(&self, default: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let key = match &self.config.id {
            Some(id) => format!("CRAWLEE_STATE_{id}"),
            None => "CRAWLEE_STATE".to_string(),
        };
        self.kv_store
            .get_auto_saved_value(&key, default)
            .await
            .map_err(Into::into)
    }

    async fn send_request(
        &self,
        request: &Request,
        session: Option<&Session>,
    ) -> anyhow::Result<TransportResponse> {
        let cookies = session.map(|s| s.cookies.clone()).unwrap_or_default();
        let proxy = session.and_then(|s| s.proxy_info.as_deref());
        self.transport.send(request, &cookies, proxy).await
    }

    async fn get_key_value_store(
        &self,
        id_or_name: Option<&str>,
    ) -> anyhow::Result<Arc<dyn KeyValueStore>> {
        if id_or_name.is_some() && id_or_name != self.config.id.as_deref() {
            warn!(
                requested = ?id_or_name,
                "named key-value stores are not multiplexed by the core; returning the default store"
            );
        }
        Ok(self.kv_store.clone())
    }
}
