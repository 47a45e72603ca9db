//! The request-processing scheduler core: C1 through C8 of `SPEC_FULL.md` §2.

pub mod autoscaled_pool;
pub mod domain_pacer;
pub mod errors;
pub mod lifecycle;
pub mod pipeline;
pub mod rate_limiter;
pub mod request_manager;
pub mod robots_cache;
pub mod session_pool;
pub mod statistics;

pub use autoscaled_pool::{AutoscaledPool, PoolOutcome, PoolPredicates};
pub use domain_pacer::{DomainPacer, PacerDecision};
pub use errors::{can_retry, ErrorKind, SchedulerError};
pub use lifecycle::{LifecycleController, RunOutcome};
pub use pipeline::{AttemptOutcome, TaskPipeline};
pub use rate_limiter::{RateLimitDecision, TaskRateLimiter};
pub use request_manager::RequestManager;
pub use robots_cache::RobotsCache;
pub use session_pool::SessionPool;
pub use statistics::{Statistics, StatisticsSnapshot};
