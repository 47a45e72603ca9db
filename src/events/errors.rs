//! Typed errors for [`crate::events::bus::SchedulerEventBus`], mirroring the
//! event-bus error taxonomy used elsewhere in the corpus.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("no active subscribers")]
    NoSubscribers,
    #[error("a subscriber lagged behind and missed {0} events")]
    ReceiverLagged(u64),
    #[error("event bus is shut down")]
    Shutdown,
}
