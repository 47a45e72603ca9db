//! C4 — per-domain last-access map enforcing `sameDomainDelay`. Grounded on
//! the lazily-created `DashMap<String, ...>` pattern in
//! `crawl_engine/domain_limiter.rs`, redesigned per `SPEC_FULL.md` §4.4 from
//! a concurrency-limiting semaphore into a last-access timestamp map (defer
//! + reclaim rather than block-on-semaphore).

use std::time::{Duration, Instant};

use dashmap::DashMap;

pub struct DomainPacer {
    last_access: DashMap<String, Instant>,
    delay: Duration,
}

#[derive(Debug, Clone, Copy)]
pub enum PacerDecision {
    Proceed,
    /// The caller should reclaim the request (forefront) and retry after
    /// this long.
    Defer(Duration),
}

impl DomainPacer {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            last_access: DashMap::new(),
            delay,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.delay.is_zero()
    }

    /// Before dispatch: if `now - last < delay`, defer; otherwise record
    /// `now` and let the caller proceed.
    pub fn check(&self, domain: &str) -> PacerDecision {
        if !self.is_enabled() {
            return PacerDecision::Proceed;
        }
        let now = Instant::now();
        let mut entry = self
            .last_access
            .entry(domain.to_string())
            .or_insert(now - self.delay);
        let elapsed = now.duration_since(*entry);
        if elapsed < self.delay {
            PacerDecision::Defer(self.delay - elapsed)
        } else {
            *entry = now;
            PacerDecision::Proceed
        }
    }
}
