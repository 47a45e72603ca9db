//! Property-style tests for the quantified invariants of `SPEC_FULL.md` §8,
//! run with `proptest` per §10.6. These exercise the pure decision functions
//! directly (`canRetry`, the enqueue-strategy filter, error fingerprinting)
//! rather than driving full async runs, since those invariants are properties
//! of the functions themselves, independent of scheduling.

use proptest::prelude::*;

use crawl_scheduler::model::request::{EnqueueStrategy, Request};
use crawl_scheduler::{can_retry, SchedulerError};

fn arb_request(
    retry_count: u32,
    max_retries: Option<u32>,
    session_rotation_count: u32,
    no_retry: bool,
) -> Request {
    let mut request = Request::new("http://a.example/1");
    request.retry_count = retry_count;
    request.max_retries = max_retries;
    request.session_rotation_count = session_rotation_count;
    request.no_retry = no_retry;
    request
}

proptest! {
    /// `request.noRetry` always wins regardless of error kind or counters
    /// (`SPEC_FULL.md` §4.7, first clause of `canRetry`).
    #[test]
    fn no_retry_flag_always_forbids_retry(
        retry_count in 0u32..50,
        max_retries in 0u32..50,
        rotation_count in 0u32..50,
        max_rotations in 0u32..50,
    ) {
        let request = arb_request(retry_count, Some(max_retries), rotation_count, true);
        let error = SchedulerError::retry_request("force retry, ignored anyway");
        prop_assert!(!can_retry(&request, &error, max_retries, max_rotations));
    }

    /// A non-retryable error never permits a retry, independent of how much
    /// retry budget remains (`SPEC_FULL.md` §4.7).
    #[test]
    fn non_retryable_kind_never_retries(
        retry_count in 0u32..50,
        max_retries in 0u32..50,
    ) {
        let request = arb_request(retry_count, Some(max_retries), 0, false);
        let error = SchedulerError::non_retryable("rejected");
        prop_assert!(!can_retry(&request, &error, max_retries, 10));
    }

    /// For a session error, `canRetry` agrees exactly with the rotation-count
    /// bound: `sessionRotationCount < maxSessionRotations`
    /// (`SPEC_FULL.md` §4.7, §8 "session rotations ≤ maxSessionRotations").
    #[test]
    fn session_error_retry_matches_rotation_bound(
        rotation_count in 0u32..20,
        max_rotations in 0u32..20,
    ) {
        let request = arb_request(0, None, rotation_count, false);
        let error = SchedulerError::session_error("blocked");
        let expected = rotation_count < max_rotations;
        prop_assert_eq!(can_retry(&request, &error, 3, max_rotations), expected);
    }

    /// A forced retry-request error always retries, even with retry budget
    /// exhausted or a per-request override of zero (`SPEC_FULL.md` §4.7,
    /// "retry-request → true (ignores count)").
    #[test]
    fn retry_request_kind_ignores_retry_count(
        retry_count in 0u32..1000,
        max_retries in 0u32..5,
    ) {
        let request = arb_request(retry_count, Some(max_retries), 0, false);
        let error = SchedulerError::retry_request("please retry");
        prop_assert!(can_retry(&request, &error, 3, 10));
    }

    /// For every other error kind, `canRetry` agrees exactly with
    /// `retryCount < effectiveMaxRetries` (`SPEC_FULL.md` §3 invariant 2 /
    /// §4.7's fallback clause), whether the per-request override is present
    /// or the crawler default applies.
    #[test]
    fn generic_retry_matches_effective_max_retries(
        retry_count in 0u32..50,
        crawler_default in 0u32..50,
        per_request_override in proptest::option::of(0u32..50),
    ) {
        let request = arb_request(retry_count, per_request_override, 0, false);
        let error = SchedulerError::handler_timeout("timed out");
        let effective = per_request_override.unwrap_or(crawler_default);
        let expected = retry_count < effective;
        prop_assert_eq!(can_retry(&request, &error, crawler_default, 10), expected);
    }

    /// `EnqueueStrategy::SameHostname` satisfaction depends only on the
    /// host component; identical hosts with differing paths/queries always
    /// satisfy it, and the relation is reflexive for any well-formed URL
    /// (`SPEC_FULL.md` §8 "Strategy filter" law).
    #[test]
    fn same_hostname_is_reflexive(
        host in "[a-z]{1,10}\\.(com|org|net)",
        path_a in "[a-z0-9/]{0,10}",
        path_b in "[a-z0-9/]{0,10}",
    ) {
        let original = format!("http://{host}/{path_a}");
        let loaded = format!("http://{host}/{path_b}");
        prop_assert!(EnqueueStrategy::SameHostname.satisfied_by(&original, &loaded));
    }

    /// `EnqueueStrategy::All` is satisfied by any pair of syntactically
    /// distinct absolute URLs, including cross-origin ones.
    #[test]
    fn all_strategy_always_satisfied(
        host_a in "[a-z]{1,10}\\.(com|org|net)",
        host_b in "[a-z]{1,10}\\.(com|org|net)",
    ) {
        let original = format!("http://{host_a}/1");
        let loaded = format!("http://{host_b}/2");
        prop_assert!(EnqueueStrategy::All.satisfied_by(&original, &loaded));
    }

    /// Error fingerprinting collapses any run of digits to a single marker,
    /// so two messages that differ only in an embedded numeric value (an id,
    /// a timestamp, a byte count) fingerprint identically
    /// (`SPEC_FULL.md` §4.8 "Error fingerprinting (supplemented)").
    #[test]
    fn fingerprint_ignores_specific_digit_values(
        prefix in "[a-z ]{0,20}",
        digits_a in "[0-9]{1,6}",
        digits_b in "[0-9]{1,6}",
        suffix in "[a-z ]{0,20}",
    ) {
        let a = SchedulerError::internal_timeout(format!("{prefix}{digits_a}{suffix}"));
        let b = SchedulerError::internal_timeout(format!("{prefix}{digits_b}{suffix}"));
        prop_assert_eq!(a.fingerprint(), b.fingerprint());
    }

    /// Two errors of different kinds never share a fingerprint even with
    /// identical messages, since the fingerprint is keyed by kind first.
    #[test]
    fn fingerprint_distinguishes_kind(message in "[a-z ]{1,20}") {
        let timeout = SchedulerError::internal_timeout(message.clone());
        let non_retryable = SchedulerError::non_retryable(message);
        prop_assert_ne!(timeout.fingerprint(), non_retryable.fingerprint());
    }
}
