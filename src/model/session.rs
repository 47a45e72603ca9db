//! Reusable request identity: cookies, proxy, and a health score that
//! decays on failure and recovers on success.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Score threshold below which [`Session::is_usable`] reports `false`.
/// Mirrored in [`crate::scheduler::session_pool`] where retirement decisions
/// are actually made; kept here so the type itself can answer "am I healthy"
/// without consulting the pool.
pub const MIN_HEALTHY_SCORE: f64 = 0.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub usage_count: u32,
    pub max_usage_count: u32,
    pub score: f64,
    pub blocked_status_codes: HashSet<u16>,
    pub cookies: Vec<(String, String)>,
    pub retired: bool,
    pub proxy_info: Option<String>,
}

impl Session {
    #[must_use]
    pub fn new(max_usage_count: u32, blocked_status_codes: HashSet<u16>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            usage_count: 0,
            max_usage_count,
            score: 100.0,
            blocked_status_codes,
            cookies: Vec::new(),
            retired: false,
            proxy_info: None,
        }
    }

    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.retired && self.usage_count < self.max_usage_count && self.score > MIN_HEALTHY_SCORE
    }

    pub fn mark_used(&mut self) {
        self.usage_count += 1;
    }

    /// Increase the health score on a successful request, capped at 100.
    pub fn mark_good(&mut self) {
        self.score = (self.score + 5.0).min(100.0);
    }

    /// Decrease the health score on a failed request; retires the session
    /// once the score bottoms out.
    pub fn mark_bad(&mut self) {
        self.score = (self.score - 20.0).max(MIN_HEALTHY_SCORE - 1.0);
        if self.score <= MIN_HEALTHY_SCORE {
            self.retired = true;
        }
    }

    pub fn retire(&mut self) {
        self.retired = true;
    }

    /// `retireOnBlockedStatusCodes` from `SPEC_FULL.md` §4.2: a response
    /// status in the configured blocked set retires the session immediately,
    /// independent of its current score.
    pub fn retire_on_blocked_status(&mut self, status: u16) -> bool {
        if self.blocked_status_codes.contains(&status) {
            self.retired = true;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_session_is_usable() {
        let session = Session::new(10, HashSet::new());
        assert!(session.is_usable());
    }

    #[test]
    fn exhausted_usage_count_is_unusable() {
        let mut session = Session::new(1, HashSet::new());
        session.mark_used();
        assert!(!session.is_usable());
    }

    #[test]
    fn repeated_failures_retire_the_session() {
        let mut session = Session::new(10, HashSet::new());
        for _ in 0..6 {
            session.mark_bad();
        }
        assert!(session.retired);
        assert!(!session.is_usable());
    }

    #[test]
    fn blocked_status_code_retires_regardless_of_score() {
        let mut session = Session::new(10, HashSet::from([403]));
        assert!(session.retire_on_blocked_status(403));
        assert!(session.retired);
    }
}
