//! C2 — produces Sessions carrying cookies, usage count, and health score;
//! retires bad ones. Grounded on the pool-of-reusable-resources shape in
//! `other_examples/.../session_pool.rs.rs` (bounded catalog, lazy creation,
//! eviction of the worst entry when full), collapsed to the single-role case
//! the scheduler needs (there is no per-role partitioning here).

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::SessionPoolOptions;
use crate::model::session::Session;

pub struct SessionPool {
    sessions: DashMap<String, Session>,
    retirement_order: Mutex<Vec<String>>,
    /// Ids currently handed out to an in-flight attempt. Guarded by its own
    /// lock so checking membership and claiming a ticket are one atomic step
    /// (`SPEC_FULL.md` §5's "sessions are owned by a single in-flight attempt"
    /// exclusivity invariant).
    checked_out: Mutex<HashSet<String>>,
    options: SessionPoolOptions,
}

impl SessionPool {
    #[must_use]
    pub fn new(options: SessionPoolOptions) -> Self {
        Self {
            sessions: DashMap::new(),
            retirement_order: Mutex::new(Vec::new()),
            checked_out: Mutex::new(HashSet::new()),
            options,
        }
    }

    /// `getSession()`: returns a usable session, preferring an existing one
    /// with spare usage budget before creating a new one, evicting the
    /// lowest-scoring retired entry if the catalog is already full. The
    /// returned session is marked checked-out until `return_session` hands
    /// it back.
    pub fn get_session(&self) -> Session {
        if let Some(candidate) = self.find_usable() {
            return candidate;
        }
        self.evict_if_full();
        let blocked = self
            .options
            .blocked_status_codes
            .iter()
            .copied()
            .collect();
        let session = Session::new(self.options.session_max_usage_count, blocked);
        self.sessions.insert(session.id.clone(), session.clone());
        self.retirement_order.lock().push(session.id.clone());
        self.checked_out.lock().insert(session.id.clone());
        session
    }

    fn find_usable(&self) -> Option<Session> {
        let mut checked_out = self.checked_out.lock();
        let candidate = self
            .sessions
            .iter()
            .find(|entry| !checked_out.contains(entry.key()) && entry.value().is_usable())
            .map(|entry| (entry.key().clone(), entry.value().clone()))?;
        checked_out.insert(candidate.0.clone());
        Some(candidate.1)
    }

    fn evict_if_full(&self) {
        if self.sessions.len() < self.options.max_pool_size {
            return;
        }
        let mut order = self.retirement_order.lock();
        // Evict the single worst-scoring entry rather than strict FIFO, so a
        // session that's still healthy but merely old survives longer than
        // one that's already struggling.
        let worst_id = self
            .sessions
            .iter()
            .min_by(|a, b| {
                a.value()
                    .score
                    .partial_cmp(&b.value().score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|entry| entry.key().clone());
        if let Some(id) = worst_id {
            self.sessions.remove(&id);
            order.retain(|existing| existing != &id);
            debug!(session_id = %id, "evicted session to make room in pool");
        }
    }

    /// Persist a mutated session (score/usage/cookie changes made during an
    /// attempt) back into the catalog. The pool is the sole mutator of the
    /// session catalog (`SPEC_FULL.md` §5), so callers hand back the whole
    /// value rather than mutating through a shared reference.
    pub fn return_session(&self, session: Session) {
        self.checked_out.lock().remove(&session.id);
        if session.retired {
            self.sessions.remove(&session.id);
            self.retirement_order.lock().retain(|id| id != &session.id);
        } else {
            self.sessions.insert(session.id.clone(), session);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Shared handle, analogous to how `Arc<BrowserPool>` is threaded through
/// worker tasks in the teacher's browser pool.
pub type SharedSessionPool = Arc<SessionPool>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_pool_produces_usable_sessions() {
        let pool = SessionPool::new(SessionPoolOptions::default());
        let session = pool.get_session();
        assert!(session.is_usable());
    }

    #[test]
    fn retired_session_returned_to_pool_is_dropped() {
        let pool = SessionPool::new(SessionPoolOptions::default());
        let mut session = pool.get_session();
        session.retire();
        let id = session.id.clone();
        pool.return_session(session);
        assert!(!pool.sessions.contains_key(&id));
    }

    #[test]
    fn pool_evicts_worst_session_when_full() {
        let options = SessionPoolOptions {
            max_pool_size: 1,
            ..SessionPoolOptions::default()
        };
        let pool = SessionPool::new(options);
        let mut first = pool.get_session();
        first.score = -5.0; // unusable but not retired, so it stays in the catalog
        let first_id = first.id.clone();
        pool.return_session(first);
        assert_eq!(pool.len(), 1);
        let second = pool.get_session();
        assert_eq!(pool.len(), 1);
        assert_ne!(second.id, first_id);
    }

    #[test]
    fn checked_out_session_is_never_handed_out_twice() {
        let pool = SessionPool::new(SessionPoolOptions::default());
        let first = pool.get_session();
        // `first` is still checked out: a second call must not see it via
        // `find_usable`, even though it remains in the catalog.
        let second = pool.get_session();
        assert_ne!(first.id, second.id);

        pool.return_session(first.clone());
        let third = pool.get_session();
        assert_eq!(third.id, first.id);
    }
}
