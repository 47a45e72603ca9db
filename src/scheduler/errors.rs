//! The error taxonomy of `SPEC_FULL.md` §7 and the `canRetry` decision
//! function of §4.7, grounded on the teacher's `FailureKind`/`is_retryable`
//! pair in `crawl_engine/crawl_types.rs`.

use thiserror::Error;

use crate::model::request::Request;

/// Error kinds, not error *types* — the taxonomy classifies a failure by how
/// the pipeline should react to it, independent of its underlying cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Critical,
    NonRetryable,
    SessionError,
    RetryRequest,
    HandlerTimeout,
    UserHandlerOrigin,
    InternalTimeout,
    StorageUnavailable,
}

#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct SchedulerError {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl SchedulerError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn critical(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Critical, message)
    }

    #[must_use]
    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NonRetryable, message)
    }

    #[must_use]
    pub fn session_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SessionError, message)
    }

    #[must_use]
    pub fn retry_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RetryRequest, message)
    }

    #[must_use]
    pub fn handler_timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::HandlerTimeout, message)
    }

    #[must_use]
    pub fn user_handler_origin(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UserHandlerOrigin, message)
    }

    #[must_use]
    pub fn internal_timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalTimeout, message)
    }

    #[must_use]
    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StorageUnavailable, message)
    }

    /// Error message, expanded with the full source chain when
    /// `CRAWLEE_VERBOSE_LOG` is set (`SPEC_FULL.md` §6). Used wherever the
    /// lifecycle controller logs a fatal or re-thrown error.
    #[must_use]
    pub fn verbose_message(&self) -> String {
        let verbose = std::env::var("CRAWLEE_VERBOSE_LOG")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        match (&self.source, verbose) {
            (Some(source), true) => format!("{self}\ncaused by: {source:?}"),
            _ => self.to_string(),
        }
    }

    /// A coarse fingerprint for the top-N error report (`SPEC_FULL.md`
    /// §4.8): error kind plus a normalized message with digit runs
    /// collapsed, so a changing id/timestamp embedded in an otherwise
    /// identical message doesn't fragment the same fault into separate
    /// buckets.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut normalized = String::with_capacity(self.message.len());
        let mut last_was_digit = false;
        for ch in self.message.to_lowercase().chars() {
            if ch.is_ascii_digit() {
                if !last_was_digit {
                    normalized.push('#');
                }
                last_was_digit = true;
            } else {
                normalized.push(ch);
                last_was_digit = false;
            }
        }
        format!("{:?}:{normalized}", self.kind)
    }
}

/// `canRetry(request, error)` from `SPEC_FULL.md` §4.7.
#[must_use]
pub fn can_retry(
    request: &Request,
    error: &SchedulerError,
    max_request_retries: u32,
    max_session_rotations: u32,
) -> bool {
    if request.no_retry {
        return false;
    }
    match error.kind {
        ErrorKind::NonRetryable => false,
        ErrorKind::SessionError => request.session_rotation_count < max_session_rotations,
        ErrorKind::RetryRequest => true,
        _ => request.retry_count < request.effective_max_retries(max_request_retries),
    }
}
