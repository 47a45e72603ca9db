//! The event bus's payload type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle signals the core emits and listens for, per `SPEC_FULL.md` §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SchedulerEvent {
    /// A process migration is underway: the pool should pause and the
    /// current request-list/statistics state should be persisted.
    Migrating { at: DateTime<Utc> },
    /// An abort was requested: in-flight tasks are being cancelled.
    Aborting { at: DateTime<Utc> },
    /// Emitted on teardown (and ahead of a migration pause) so a listening
    /// persistence layer can snapshot state.
    PersistState {
        is_migrating: bool,
        at: DateTime<Utc>,
    },
}

impl SchedulerEvent {
    #[must_use]
    pub fn migrating() -> Self {
        Self::Migrating { at: Utc::now() }
    }

    #[must_use]
    pub fn aborting() -> Self {
        Self::Aborting { at: Utc::now() }
    }

    #[must_use]
    pub fn persist_state(is_migrating: bool) -> Self {
        Self::PersistState {
            is_migrating,
            at: Utc::now(),
        }
    }
}
