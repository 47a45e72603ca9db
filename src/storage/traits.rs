//! Required operations of the storage provider boundary (`SPEC_FULL.md` §6).
//!
//! The core never depends on a concrete persistence format; it only calls
//! through these traits. `async_trait` is used so the traits stay
//! dyn-compatible, matching the factory-function provider pattern used
//! elsewhere in the corpus for pluggable backends.

use async_trait::async_trait;

use crate::model::Request;
use crate::storage::StorageError;

pub type StorageResult<T> = Result<T, StorageError>;

/// Options accepted by [`RequestProvider::add_requests_batched`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AddRequestsOptions {
    pub forefront: bool,
}

/// Result of a (possibly partial) batch insert.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchAddResult {
    pub added: usize,
    pub pending: usize,
}

/// The request queue / request list persistence boundary.
///
/// Implementations own locking: `fetch_next_request` implicitly acquires a
/// lock that `mark_request_handled`, `reclaim_request`, or
/// `delete_request_lock` release.
#[async_trait]
pub trait RequestProvider: Send + Sync {
    async fn fetch_next_request(&self) -> StorageResult<Option<Request>>;
    async fn add_request(&self, request: Request, forefront: bool) -> StorageResult<()>;
    async fn add_requests_batched(
        &self,
        requests: Vec<Request>,
        options: AddRequestsOptions,
    ) -> StorageResult<BatchAddResult>;
    async fn reclaim_request(&self, request: Request, forefront: bool) -> StorageResult<()>;
    async fn mark_request_handled(&self, request: Request) -> StorageResult<()>;
    async fn is_empty(&self) -> StorageResult<bool>;
    async fn is_finished(&self) -> StorageResult<bool>;
    async fn handled_count(&self) -> StorageResult<u64>;
    async fn get_total_count(&self) -> StorageResult<u64>;
    async fn get_pending_count(&self) -> StorageResult<u64>;
    async fn delete_request_lock(&self, request_id: &str) -> StorageResult<()>;
    async fn drop_storage(&self) -> StorageResult<()>;
    fn name(&self) -> &str;
}

/// Crawler-scoped key-value storage, used directly by `useState` and
/// indirectly by `getKeyValueStore`.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn open(id_or_name: Option<&str>) -> StorageResult<Self>
    where
        Self: Sized;

    /// Reads `key`; if absent, writes and returns `default`. Subsequent
    /// calls with the same key observe whatever the last writer stored
    /// (read-modify-write, per `SPEC_FULL.md` §5's shared-resource policy).
    async fn get_auto_saved_value(
        &self,
        key: &str,
        default: serde_json::Value,
    ) -> StorageResult<serde_json::Value>;

    async fn set_value(&self, key: &str, value: serde_json::Value) -> StorageResult<()>;
    async fn get_value(&self, key: &str) -> StorageResult<Option<serde_json::Value>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

/// Top-level storage client operations that aren't scoped to one queue or
/// store.
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn teardown(&self) -> StorageResult<()> {
        Ok(())
    }
    async fn set_status_message(
        &self,
        message: &str,
        level: StatusLevel,
        is_terminal: bool,
    ) -> StorageResult<()> {
        let _ = (message, level, is_terminal);
        Ok(())
    }
    async fn purge(&self) -> StorageResult<()>;
}
