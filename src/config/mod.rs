//! Configuration module for the scheduler core.
//!
//! Provides `SchedulerConfig` and its typestate builder for configuring a
//! crawl run with validation and the defaults enumerated in
//! `SPEC_FULL.md` §6.

pub mod builder;
pub mod types;

pub use builder::{NeedsHandler, Ready, SchedulerConfigBuilder};
pub use types::{
    AutoscaledPoolOptions, BoxFuture, ErrorHandler, FailedRequestHandler, RequestHandler,
    RobotsTxtOption, SchedulerConfig, SessionPoolOptions, SkipCallback, StatisticsOptions,
    StatusMessageCallback,
};
