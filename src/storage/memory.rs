//! In-memory reference implementation of the storage traits, used by this
//! crate's own tests. Not a production backend — a real deployment supplies
//! its own provider (key-value store, request queue) per `SPEC_FULL.md` §6.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::model::Request;
use crate::storage::traits::{
    AddRequestsOptions, BatchAddResult, KeyValueStore, RequestProvider, StatusLevel,
    StorageClient, StorageResult,
};

/// A single in-process request queue. Forefront inserts go to the front of
/// the deque; everything else appends, preserving FIFO order among
/// non-forefront items per `SPEC_FULL.md` §5.
#[derive(Default)]
pub struct InMemoryRequestProvider {
    inner: Mutex<Inner>,
    handled_count: AtomicU64,
    total_count: AtomicU64,
}

#[derive(Default)]
struct Inner {
    pending: VecDeque<Request>,
    in_flight: HashMap<String, Request>,
}

impl InMemoryRequestProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequestProvider for InMemoryRequestProvider {
    async fn fetch_next_request(&self) -> StorageResult<Option<Request>> {
        let mut inner = self.inner.lock();
        let Some(request) = inner.pending.pop_front() else {
            return Ok(None);
        };
        inner.in_flight.insert(request.id.clone(), request.clone());
        Ok(Some(request))
    }

    async fn add_request(&self, request: Request, forefront: bool) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        if forefront {
            inner.pending.push_front(request);
        } else {
            inner.pending.push_back(request);
        }
        self.total_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn add_requests_batched(
        &self,
        requests: Vec<Request>,
        options: AddRequestsOptions,
    ) -> StorageResult<BatchAddResult> {
        let added = requests.len();
        for request in requests {
            self.add_request(request, options.forefront).await?;
        }
        Ok(BatchAddResult { added, pending: 0 })
    }

    async fn reclaim_request(&self, request: Request, forefront: bool) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        inner.in_flight.remove(&request.id);
        if forefront {
            inner.pending.push_front(request);
        } else {
            inner.pending.push_back(request);
        }
        Ok(())
    }

    async fn mark_request_handled(&self, request: Request) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        // Idempotent: a second call for an id no longer in-flight is a no-op,
        // per the `markHandled` idempotence law in `SPEC_FULL.md` §8.
        if inner.in_flight.remove(&request.id).is_some() {
            self.handled_count.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn is_empty(&self) -> StorageResult<bool> {
        let inner = self.inner.lock();
        Ok(inner.pending.is_empty() && inner.in_flight.is_empty())
    }

    async fn is_finished(&self) -> StorageResult<bool> {
        self.is_empty().await
    }

    async fn handled_count(&self) -> StorageResult<u64> {
        Ok(self.handled_count.load(Ordering::Relaxed))
    }

    async fn get_total_count(&self) -> StorageResult<u64> {
        Ok(self.total_count.load(Ordering::Relaxed))
    }

    async fn get_pending_count(&self) -> StorageResult<u64> {
        Ok(self.inner.lock().pending.len() as u64)
    }

    async fn delete_request_lock(&self, request_id: &str) -> StorageResult<()> {
        self.inner.lock().in_flight.remove(request_id);
        Ok(())
    }

    async fn drop_storage(&self) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        inner.pending.clear();
        inner.in_flight.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

/// In-memory key-value store, also used as the backing store for
/// `useState`.
#[derive(Default)]
pub struct InMemoryKeyValueStore {
    values: Mutex<HashMap<String, serde_json::Value>>,
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn open(_id_or_name: Option<&str>) -> StorageResult<Self> {
        Ok(Self::default())
    }

    async fn get_auto_saved_value(
        &self,
        key: &str,
        default: serde_json::Value,
    ) -> StorageResult<serde_json::Value> {
        let mut values = self.values.lock();
        if let Some(existing) = values.get(key) {
            return Ok(existing.clone());
        }
        values.insert(key.to_string(), default.clone());
        Ok(default)
    }

    async fn set_value(&self, key: &str, value: serde_json::Value) -> StorageResult<()> {
        self.values.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn get_value(&self, key: &str) -> StorageResult<Option<serde_json::Value>> {
        Ok(self.values.lock().get(key).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryStorageClient;

#[async_trait]
impl StorageClient for InMemoryStorageClient {
    async fn teardown(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn set_status_message(
        &self,
        message: &str,
        level: StatusLevel,
        is_terminal: bool,
    ) -> StorageResult<()> {
        tracing::info!(target: "storage", %message, ?level, is_terminal, "status message");
        Ok(())
    }

    async fn purge(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forefront_insert_is_dispatched_before_non_forefront() {
        let provider = InMemoryRequestProvider::new();
        provider
            .add_request(Request::new("http://a/1"), false)
            .await
            .unwrap();
        provider
            .add_request(Request::new("http://a/2"), true)
            .await
            .unwrap();
        let next = provider.fetch_next_request().await.unwrap().unwrap();
        assert_eq!(next.url, "http://a/2");
    }

    #[tokio::test]
    async fn mark_handled_twice_is_a_no_op() {
        let provider = InMemoryRequestProvider::new();
        let request = Request::new("http://a/1");
        provider.add_request(request.clone(), false).await.unwrap();
        let fetched = provider.fetch_next_request().await.unwrap().unwrap();
        provider.mark_request_handled(fetched.clone()).await.unwrap();
        provider.mark_request_handled(fetched).await.unwrap();
        assert_eq!(provider.handled_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn use_state_default_is_sticky_across_calls() {
        let store = InMemoryKeyValueStore::open(None).await.unwrap();
        let first = store
            .get_auto_saved_value("CRAWLEE_STATE", serde_json::json!({"count": 0}))
            .await
            .unwrap();
        store
            .set_value("CRAWLEE_STATE", serde_json::json!({"count": 1}))
            .await
            .unwrap();
        let second = store
            .get_auto_saved_value("CRAWLEE_STATE", serde_json::json!({"count": 0}))
            .await
            .unwrap();
        assert_eq!(first, serde_json::json!({"count": 0}));
        assert_eq!(second, serde_json::json!({"count": 1}));
    }
}
