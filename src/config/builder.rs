//! Type-safe builder for `SchedulerConfig` using the typestate pattern.
//!
//! The only required field is `request_handler` (`SPEC_FULL.md` §6 lists it
//! first among the enumerated configuration options, and every other option
//! has a documented default). The builder therefore has two states:
//! [`NeedsHandler`] before it is supplied, and [`Ready`] once `build()`
//! becomes callable. This mirrors the teacher's marker-struct-per-required-
//! field approach, just collapsed to a single required field instead of two.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::config::types::{
    AutoscaledPoolOptions, ErrorHandler, FailedRequestHandler, RequestHandler, RobotsTxtOption,
    SchedulerConfig, SessionPoolOptions, SkipCallback, StatisticsOptions, StatusMessageCallback,
};

pub struct NeedsHandler;
pub struct Ready;

pub struct SchedulerConfigBuilder<State = NeedsHandler> {
    request_handler: Option<RequestHandler>,
    error_handler: Option<ErrorHandler>,
    failed_request_handler: Option<FailedRequestHandler>,
    request_handler_timeout_secs: u64,
    max_request_retries: u32,
    max_session_rotations: u32,
    same_domain_delay_secs: u64,
    max_requests_per_crawl: Option<u64>,
    max_crawl_depth: Option<u32>,
    max_requests_per_minute: Option<u32>,
    min_concurrency: usize,
    max_concurrency: usize,
    keep_alive: bool,
    use_session_pool: bool,
    session_pool_options: SessionPoolOptions,
    retry_on_blocked: bool,
    respect_robots_txt_file: RobotsTxtOption,
    on_skipped_request: Option<SkipCallback>,
    status_message_logging_interval_secs: u64,
    status_message_callback: Option<StatusMessageCallback>,
    statistics_options: StatisticsOptions,
    id: Option<String>,
    autoscaled_pool_options: AutoscaledPoolOptions,
    purge_request_queue: bool,
    _state: PhantomData<State>,
}

impl Default for SchedulerConfigBuilder<NeedsHandler> {
    fn default() -> Self {
        Self {
            request_handler: None,
            error_handler: None,
            failed_request_handler: None,
            request_handler_timeout_secs: 60,
            max_request_retries: 3,
            max_session_rotations: 10,
            same_domain_delay_secs: 0,
            max_requests_per_crawl: None,
            max_crawl_depth: None,
            max_requests_per_minute: None,
            min_concurrency: 1,
            max_concurrency: 200,
            keep_alive: false,
            use_session_pool: true,
            session_pool_options: SessionPoolOptions::default(),
            retry_on_blocked: false,
            respect_robots_txt_file: RobotsTxtOption::default(),
            on_skipped_request: None,
            status_message_logging_interval_secs: 10,
            status_message_callback: None,
            statistics_options: StatisticsOptions::default(),
            id: None,
            autoscaled_pool_options: AutoscaledPoolOptions::default(),
            purge_request_queue: false,
            _state: PhantomData,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn builder() -> SchedulerConfigBuilder<NeedsHandler> {
        SchedulerConfigBuilder::default()
    }
}

impl SchedulerConfigBuilder<NeedsHandler> {
    /// Supplies the user request handler. This is the only field `build()`
    /// requires; every other option has a spec-mandated default.
    #[must_use]
    pub fn request_handler<F, Fut>(self, handler: F) -> SchedulerConfigBuilder<Ready>
    where
        F: Fn(crate::model::CrawlingContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: RequestHandler = Arc::new(move |ctx| Box::pin(handler(ctx)));
        SchedulerConfigBuilder {
            request_handler: Some(handler),
            error_handler: self.error_handler,
            failed_request_handler: self.failed_request_handler,
            request_handler_timeout_secs: self.request_handler_timeout_secs,
            max_request_retries: self.max_request_retries,
            max_session_rotations: self.max_session_rotations,
            same_domain_delay_secs: self.same_domain_delay_secs,
            max_requests_per_crawl: self.max_requests_per_crawl,
            max_crawl_depth: self.max_crawl_depth,
            max_requests_per_minute: self.max_requests_per_minute,
            min_concurrency: self.min_concurrency,
            max_concurrency: self.max_concurrency,
            keep_alive: self.keep_alive,
            use_session_pool: self.use_session_pool,
            session_pool_options: self.session_pool_options,
            retry_on_blocked: self.retry_on_blocked,
            respect_robots_txt_file: self.respect_robots_txt_file,
            on_skipped_request: self.on_skipped_request,
            status_message_logging_interval_secs: self.status_message_logging_interval_secs,
            status_message_callback: self.status_message_callback,
            statistics_options: self.statistics_options,
            id: self.id,
            autoscaled_pool_options: self.autoscaled_pool_options,
            purge_request_queue: self.purge_request_queue,
            _state: PhantomData,
        }
    }
}

impl SchedulerConfigBuilder<Ready> {
    /// Validates cross-field constraints and produces the immutable config.
    ///
    /// # Errors
    /// Returns an error if `min_concurrency > max_concurrency`, or if either
    /// concurrency bound is zero.
    pub fn build(self) -> anyhow::Result<SchedulerConfig> {
        if self.max_concurrency == 0 {
            anyhow::bail!("max_concurrency must be at least 1");
        }
        if self.min_concurrency > self.max_concurrency {
            anyhow::bail!(
                "min_concurrency ({}) must not exceed max_concurrency ({})",
                self.min_concurrency,
                self.max_concurrency
            );
        }
        let Some(request_handler) = self.request_handler else {
            anyhow::bail!("request_handler is required");
        };
        Ok(SchedulerConfig {
            request_handler,
            error_handler: self.error_handler,
            failed_request_handler: self.failed_request_handler,
            request_handler_timeout_secs: self.request_handler_timeout_secs,
            max_request_retries: self.max_request_retries,
            max_session_rotations: self.max_session_rotations,
            same_domain_delay_secs: self.same_domain_delay_secs,
            max_requests_per_crawl: self.max_requests_per_crawl,
            max_crawl_depth: self.max_crawl_depth,
            max_requests_per_minute: self.max_requests_per_minute,
            min_concurrency: self.min_concurrency,
            max_concurrency: self.max_concurrency,
            keep_alive: self.keep_alive,
            use_session_pool: self.use_session_pool,
            session_pool_options: self.session_pool_options,
            retry_on_blocked: self.retry_on_blocked,
            respect_robots_txt_file: self.respect_robots_txt_file,
            on_skipped_request: self.on_skipped_request,
            status_message_logging_interval_secs: self.status_message_logging_interval_secs,
            status_message_callback: self.status_message_callback,
            statistics_options: self.statistics_options,
            id: self.id,
            autoscaled_pool_options: self.autoscaled_pool_options,
            purge_request_queue: self.purge_request_queue,
        })
    }
}

/// Setters available regardless of builder state, mirroring the teacher's
/// `impl<State> CrawlConfigBuilder<State>` block in `methods.rs`.
impl<State> SchedulerConfigBuilder<State> {
    #[must_use]
    pub fn error_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(crate::model::CrawlingContext, Arc<crate::scheduler::errors::SchedulerError>) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.error_handler = Some(Arc::new(move |ctx, err| Box::pin(handler(ctx, err))));
        self
    }

    #[must_use]
    pub fn failed_request_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(crate::model::CrawlingContext, Arc<crate::scheduler::errors::SchedulerError>) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.failed_request_handler = Some(Arc::new(move |ctx, err| Box::pin(handler(ctx, err))));
        self
    }

    #[must_use]
    pub fn request_handler_timeout_secs(mut self, secs: u64) -> Self {
        self.request_handler_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn max_request_retries(mut self, max: u32) -> Self {
        self.max_request_retries = max;
        self
    }

    #[must_use]
    pub fn max_session_rotations(mut self, max: u32) -> Self {
        self.max_session_rotations = max;
        self
    }

    #[must_use]
    pub fn same_domain_delay_secs(mut self, secs: u64) -> Self {
        self.same_domain_delay_secs = secs;
        self
    }

    #[must_use]
    pub fn max_requests_per_crawl(mut self, max: u64) -> Self {
        self.max_requests_per_crawl = Some(max);
        self
    }

    #[must_use]
    pub fn max_crawl_depth(mut self, max: u32) -> Self {
        self.max_crawl_depth = Some(max);
        self
    }

    #[must_use]
    pub fn max_requests_per_minute(mut self, max: u32) -> Self {
        self.max_requests_per_minute = Some(max);
        self
    }

    #[must_use]
    pub fn min_concurrency(mut self, min: usize) -> Self {
        self.min_concurrency = min;
        self
    }

    #[must_use]
    pub fn max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    #[must_use]
    pub fn use_session_pool(mut self, use_session_pool: bool) -> Self {
        self.use_session_pool = use_session_pool;
        self
    }

    #[must_use]
    pub fn session_pool_options(mut self, options: SessionPoolOptions) -> Self {
        self.session_pool_options = options;
        self
    }

    #[must_use]
    pub fn retry_on_blocked(mut self, retry_on_blocked: bool) -> Self {
        self.retry_on_blocked = retry_on_blocked;
        // Per SPEC_FULL.md §4.2: enabling retryOnBlocked forces an empty
        // default blocked-status set to avoid conflicting retirement.
        if retry_on_blocked {
            self.session_pool_options.blocked_status_codes.clear();
        }
        self
    }

    #[must_use]
    pub fn respect_robots_txt_file(mut self, user_agent: impl Into<String>) -> Self {
        self.respect_robots_txt_file = RobotsTxtOption::Enabled {
            user_agent: user_agent.into(),
        };
        self
    }

    #[must_use]
    pub fn on_skipped_request(mut self, callback: SkipCallback) -> Self {
        self.on_skipped_request = Some(callback);
        self
    }

    #[must_use]
    pub fn status_message_logging_interval_secs(mut self, secs: u64) -> Self {
        self.status_message_logging_interval_secs = secs;
        self
    }

    #[must_use]
    pub fn status_message_callback(mut self, callback: StatusMessageCallback) -> Self {
        self.status_message_callback = Some(callback);
        self
    }

    #[must_use]
    pub fn statistics_options(mut self, options: StatisticsOptions) -> Self {
        self.statistics_options = options;
        self
    }

    /// Isolates persisted state (`useState`, handled-count restore) under
    /// this id, per `SPEC_FULL.md` §4.8.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn autoscaled_pool_options(mut self, options: AutoscaledPoolOptions) -> Self {
        self.autoscaled_pool_options = options;
        self
    }

    /// `purgeRequestQueue` from `SPEC_FULL.md` §4.9: drop and reopen the
    /// queue, and reset counters/stats, on every run after the first.
    #[must_use]
    pub fn purge_request_queue(mut self, purge: bool) -> Self {
        self.purge_request_queue = purge;
        self
    }
}
