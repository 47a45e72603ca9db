//! Event bus for the lifecycle signals of `SPEC_FULL.md` §6 and §10.5:
//! `MIGRATING`, `ABORTING`, and `PERSIST_STATE`.

pub mod bus;
pub mod errors;
pub mod types;

pub use bus::SchedulerEventBus;
pub use errors::EventBusError;
pub use types::SchedulerEvent;
