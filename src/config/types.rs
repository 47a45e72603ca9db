//! The `SchedulerConfig` struct: the enumerated configuration options of
//! `SPEC_FULL.md` §6, plus the handler/callback types a config instance
//! carries.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::model::request::{Request, SkippedReason};
use crate::model::CrawlingContext;
use crate::scheduler::errors::SchedulerError;
use crate::scheduler::statistics::StatisticsSnapshot;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type RequestHandler =
    Arc<dyn Fn(CrawlingContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
pub type ErrorHandler = Arc<
    dyn Fn(CrawlingContext, Arc<SchedulerError>) -> BoxFuture<'static, anyhow::Result<()>>
        + Send
        + Sync,
>;
pub type FailedRequestHandler =
    Arc<dyn Fn(CrawlingContext, Arc<SchedulerError>) -> BoxFuture<'static, ()> + Send + Sync>;
pub type SkipCallback = Arc<dyn Fn(&Request, SkippedReason) + Send + Sync>;
pub type StatusMessageCallback = Arc<dyn Fn(&StatisticsSnapshot) -> String + Send + Sync>;

/// `respectRobotsTxtFile` from `SPEC_FULL.md` §6: either disabled, or
/// enabled with the user agent to evaluate robots rules for.
#[derive(Debug, Clone, Default)]
pub enum RobotsTxtOption {
    #[default]
    Disabled,
    Enabled {
        user_agent: String,
    },
}

#[derive(Debug, Clone)]
pub struct SessionPoolOptions {
    pub max_pool_size: usize,
    pub session_max_usage_count: u32,
    pub blocked_status_codes: Vec<u16>,
}

impl Default for SessionPoolOptions {
    fn default() -> Self {
        Self {
            max_pool_size: 1000,
            session_max_usage_count: 50,
            blocked_status_codes: vec![401, 403, 429],
        }
    }
}

/// `autoscaledPoolOptions` passthrough, minus `runTaskFunction` which the
/// core owns (`SPEC_FULL.md` §6).
#[derive(Debug, Clone, Default)]
pub struct AutoscaledPoolOptions {
    pub desired_concurrency: Option<usize>,
    pub scale_up_cooldown_secs: u64,
}

#[derive(Debug, Clone, Default)]
pub struct StatisticsOptions {
    pub retry_histogram_buckets: usize,
}

#[derive(Clone)]
pub struct SchedulerConfig {
    pub request_handler: RequestHandler,
    pub error_handler: Option<ErrorHandler>,
    pub failed_request_handler: Option<FailedRequestHandler>,

    pub request_handler_timeout_secs: u64,
    pub max_request_retries: u32,
    pub max_session_rotations: u32,
    pub same_domain_delay_secs: u64,
    pub max_requests_per_crawl: Option<u64>,
    pub max_crawl_depth: Option<u32>,
    pub max_requests_per_minute: Option<u32>,
    pub min_concurrency: usize,
    pub max_concurrency: usize,
    pub keep_alive: bool,
    pub use_session_pool: bool,
    pub session_pool_options: SessionPoolOptions,
    pub retry_on_blocked: bool,
    pub respect_robots_txt_file: RobotsTxtOption,
    pub on_skipped_request: Option<SkipCallback>,
    pub status_message_logging_interval_secs: u64,
    pub status_message_callback: Option<StatusMessageCallback>,
    pub statistics_options: StatisticsOptions,
    pub id: Option<String>,
    pub autoscaled_pool_options: AutoscaledPoolOptions,
    /// Whether a second-and-later `run()` on the same crawler drops and
    /// reopens the queue and resets counters/stats before resuming
    /// (`SPEC_FULL.md` §4.9, step 2). Never affects the very first run, which
    /// is instead governed by the one-shot `CRAWLEE_PURGE_ON_START` purge.
    pub purge_request_queue: bool,
}

impl std::fmt::Debug for SchedulerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerConfig")
            .field(
                "request_handler_timeout_secs",
                &self.request_handler_timeout_secs,
            )
            .field("max_request_retries", &self.max_request_retries)
            .field("max_session_rotations", &self.max_session_rotations)
            .field("same_domain_delay_secs", &self.same_domain_delay_secs)
            .field("max_requests_per_crawl", &self.max_requests_per_crawl)
            .field("max_crawl_depth", &self.max_crawl_depth)
            .field("max_requests_per_minute", &self.max_requests_per_minute)
            .field("min_concurrency", &self.min_concurrency)
            .field("max_concurrency", &self.max_concurrency)
            .field("keep_alive", &self.keep_alive)
            .field("use_session_pool", &self.use_session_pool)
            .field("retry_on_blocked", &self.retry_on_blocked)
            .field("respect_robots_txt_file", &self.respect_robots_txt_file)
            .field("id", &self.id)
            .field("purge_request_queue", &self.purge_request_queue)
            .finish_non_exhaustive()
    }
}

impl SchedulerConfig {
    /// `internalTimeoutMillis` default from `SPEC_FULL.md` §5:
    /// `max(2 × requestHandlerTimeoutMillis, 5 min)`, overridable via the
    /// `CRAWLEE_INTERNAL_TIMEOUT` environment variable (milliseconds) and
    /// clamped to a signed 32-bit millisecond range either way.
    #[must_use]
    pub fn internal_timeout_secs(&self) -> u64 {
        let default_ms = i64::from((2 * self.request_handler_timeout_secs).max(300) as u32) * 1000;
        let ms = std::env::var("CRAWLEE_INTERNAL_TIMEOUT")
            .ok()
            .and_then(|raw| raw.parse::<i64>().ok())
            .unwrap_or(default_ms);
        (ms.clamp(0, i64::from(i32::MAX)) as u64) / 1000
    }
}
