//! The `Request` work item and its associated small value types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single work item flowing through the scheduler.
///
/// Headers are case-insensitive on lookup but both the originally supplied
/// casing and the header name used to look them up are preserved, matching
/// how HTTP intermediaries are expected to treat header names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub unique_key: String,
    pub url: String,
    pub loaded_url: Option<String>,
    pub method: String,
    pub headers: HeaderBag,
    pub payload: Option<Vec<u8>>,
    pub user_data: serde_json::Map<String, serde_json::Value>,
    pub retry_count: u32,
    pub max_retries: Option<u32>,
    pub session_rotation_count: u32,
    pub no_retry: bool,
    pub crawl_depth: u32,
    pub enqueue_strategy: Option<EnqueueStrategy>,
    pub skipped_reason: Option<SkippedReason>,
    pub state: RequestState,
    pub error_messages: Vec<String>,
}

impl Request {
    /// Build a fresh, unprocessed `GET` request for `url`.
    ///
    /// `unique_key` defaults to the raw URL, which is the common case; callers
    /// that need custom deduplication (query-param stripping, fragment
    /// normalization) should override it with [`Request::with_unique_key`].
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            id: Uuid::new_v4().to_string(),
            unique_key: url.clone(),
            url,
            loaded_url: None,
            method: "GET".to_string(),
            headers: HeaderBag::default(),
            payload: None,
            user_data: serde_json::Map::new(),
            retry_count: 0,
            max_retries: None,
            session_rotation_count: 0,
            no_retry: false,
            crawl_depth: 0,
            enqueue_strategy: None,
            skipped_reason: None,
            state: RequestState::Unprocessed,
            error_messages: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_unique_key(mut self, unique_key: impl Into<String>) -> Self {
        self.unique_key = unique_key.into();
        self
    }

    #[must_use]
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.crawl_depth = depth;
        self
    }

    #[must_use]
    pub fn with_enqueue_strategy(mut self, strategy: EnqueueStrategy) -> Self {
        self.enqueue_strategy = Some(strategy);
        self
    }

    /// `request.maxRetries ?? crawler.maxRequestRetries`, per the invariant in
    /// `SPEC_FULL.md` §3.
    #[must_use]
    pub fn effective_max_retries(&self, crawler_default: u32) -> u32 {
        self.max_retries.unwrap_or(crawler_default)
    }

    /// Forefront flag carried inside `userData`, mirroring
    /// `userData.__crawlee.forefront` from the distilled spec.
    #[must_use]
    pub fn forefront_requested(&self) -> bool {
        self.user_data
            .get("__scheduler")
            .and_then(|v| v.get("forefront"))
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    pub fn mark_skipped(&mut self, reason: SkippedReason) {
        self.skipped_reason = Some(reason);
        self.no_retry = true;
        self.state = RequestState::Skipped;
    }
}

/// Case-insensitive header bag that preserves the original casing of both
/// the stored name and the name used to query it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeaderBag {
    entries: Vec<(String, String)>,
}

impl HeaderBag {
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnqueueStrategy {
    SameHostname,
    SameDomain,
    SameOrigin,
    All,
}

impl EnqueueStrategy {
    /// Whether `loaded_url` still satisfies this strategy relative to the
    /// originally enqueued `url`. Both must parse as absolute URLs; a parse
    /// failure is treated as a mismatch (fails closed).
    #[must_use]
    pub fn satisfied_by(self, original_url: &str, loaded_url: &str) -> bool {
        let (Ok(original), Ok(loaded)) = (
            url::Url::parse(original_url),
            url::Url::parse(loaded_url),
        ) else {
            return false;
        };
        match self {
            EnqueueStrategy::All => true,
            EnqueueStrategy::SameOrigin => original.origin() == loaded.origin(),
            EnqueueStrategy::SameHostname => original.host_str() == loaded.host_str(),
            EnqueueStrategy::SameDomain => {
                registrable_domain(original.host_str()) == registrable_domain(loaded.host_str())
            }
        }
    }
}

/// Crude eTLD+1 approximation: last two dot-separated labels. Adequate for
/// the scheduler's own pacer/strategy comparisons; a full public-suffix
/// lookup is explicitly out of scope (URL filtering is an excluded
/// collaborator per `SPEC_FULL.md` §1).
fn registrable_domain(host: Option<&str>) -> Option<String> {
    let host = host?;
    let mut labels: Vec<&str> = host.split('.').collect();
    if labels.len() > 2 {
        labels = labels[labels.len() - 2..].to_vec();
    }
    Some(labels.join("."))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkippedReason {
    RobotsTxt,
    Depth,
    Redirect,
    Limit,
}

impl SkippedReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SkippedReason::RobotsTxt => "robotsTxt",
            SkippedReason::Depth => "depth",
            SkippedReason::Redirect => "redirect",
            SkippedReason::Limit => "limit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    Unprocessed,
    RequestHandler,
    ErrorHandler,
    Done,
    Error,
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_max_retries_falls_back_to_crawler_default() {
        let req = Request::new("http://a/1");
        assert_eq!(req.effective_max_retries(3), 3);
        let req = Request::new("http://a/1");
        let req = Request {
            max_retries: Some(7),
            ..req
        };
        assert_eq!(req.effective_max_retries(3), 7);
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut headers = HeaderBag::default();
        headers.insert("Content-Type", "text/html");
        assert_eq!(headers.get("content-type"), Some("text/html"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/html"));
    }

    #[test]
    fn same_hostname_strategy_rejects_cross_host_redirect() {
        assert!(EnqueueStrategy::SameHostname.satisfied_by("http://a.com/1", "http://a.com/2"));
        assert!(!EnqueueStrategy::SameHostname.satisfied_by("http://a.com/1", "http://b.com/2"));
    }

    #[test]
    fn same_domain_strategy_allows_subdomain_redirect() {
        assert!(EnqueueStrategy::SameDomain.satisfied_by("http://a.example.com/1", "http://b.example.com/2"));
        assert!(!EnqueueStrategy::SameDomain.satisfied_by("http://a.example.com/1", "http://other.org/2"));
    }

    #[test]
    fn mark_skipped_sets_terminal_state() {
        let mut req = Request::new("http://a/1");
        req.mark_skipped(SkippedReason::RobotsTxt);
        assert_eq!(req.state, RequestState::Skipped);
        assert!(req.no_retry);
        assert_eq!(req.skipped_reason, Some(SkippedReason::RobotsTxt));
    }
}
