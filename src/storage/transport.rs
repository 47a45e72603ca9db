//! Host-supplied hooks for the two operations `SPEC_FULL.md` explicitly
//! excludes from the core: issuing the actual HTTP request behind
//! `sendRequest`, and fetching/parsing a robots.txt document. The core only
//! owns the decision logic around these hooks (cookie/proxy threading,
//! retry suppression, LRU caching of the parsed result).

use async_trait::async_trait;

use crate::model::request::HeaderBag;
use crate::model::Request;

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderBag,
    pub body: Vec<u8>,
    pub final_url: String,
}

/// Issues the request behind `sendRequest`. Transport-level retries must be
/// disabled by the implementation; the scheduler's own retry machinery
/// (`SPEC_FULL.md` §4.7) is the single source of truth for whether an
/// attempt is repeated.
#[async_trait]
pub trait RequestTransport: Send + Sync {
    async fn send(
        &self,
        request: &Request,
        cookies: &[(String, String)],
        proxy: Option<&str>,
    ) -> anyhow::Result<TransportResponse>;
}

/// Fetches and parses a robots.txt document for one origin. Fetch failures
/// are non-fatal at the call site (`SPEC_FULL.md` §4.5 treats them as
/// "allow"); this trait only reports the parsed policy.
#[async_trait]
pub trait RobotsFetcher: Send + Sync {
    async fn fetch(&self, origin: &str) -> anyhow::Result<RobotsPolicy>;
}

/// A minimal robots.txt policy: allow/deny per path prefix for one
/// user agent. Parsing the raw document text is the fetcher's job; the
/// cache only ever asks this type `is_allowed`.
#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    pub disallowed_prefixes: Vec<String>,
}

impl RobotsPolicy {
    #[must_use]
    pub fn is_allowed(&self, path: &str) -> bool {
        !self
            .disallowed_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_denies_matching_prefix() {
        let policy = RobotsPolicy {
            disallowed_prefixes: vec!["/private".to_string()],
        };
        assert!(!policy.is_allowed("/private/data"));
        assert!(policy.is_allowed("/public"));
    }
}
