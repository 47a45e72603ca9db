//! A request-processing scheduler core for general-purpose web crawling:
//! drives an extensible supply of pending URLs through a user-supplied
//! handler under controlled concurrency, with retries, session rotation,
//! per-domain pacing, robots-policy enforcement, graceful shutdown, and
//! durable progress across restarts.
//!
//! The concrete HTTP/browser adapter, the persistence backend, and link
//! extraction/robots fetching are all supplied by the host through the
//! trait boundaries in [`storage`]; this crate owns only the coordination
//! of [`scheduler`]'s eight components.

pub mod config;
pub mod events;
pub mod model;
pub mod scheduler;
pub mod storage;

pub use config::{
    RobotsTxtOption, SchedulerConfig, SchedulerConfigBuilder, SessionPoolOptions,
    StatisticsOptions,
};
pub use events::{EventBusError, SchedulerEvent, SchedulerEventBus};
pub use model::{CrawlingContext, EnqueueStrategy, Request, RequestState, Session, SkippedReason};
pub use scheduler::{
    can_retry, AttemptOutcome, AutoscaledPool, DomainPacer, ErrorKind, LifecycleController,
    PacerDecision, PoolOutcome, PoolPredicates, RateLimitDecision, RequestManager, RobotsCache,
    RunOutcome, SchedulerError, SessionPool, Statistics, StatisticsSnapshot, TaskPipeline,
    TaskRateLimiter,
};
pub use storage::{KeyValueStore, RequestProvider, RequestTransport, RobotsFetcher, StorageClient};
