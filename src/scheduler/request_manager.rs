//! C1 — unified view over a static Request List and/or a dynamic Request
//! Queue, grounded on the priority-queue-plus-retry-queue shape of
//! `other_examples/.../task_queue_refactored.rs.rs` and the
//! `{ListOnly, QueueOnly, Tandem}` tagged-variant design note in
//! `SPEC_FULL.md` §9.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::warn;

use crate::model::request::Request;
use crate::storage::traits::{AddRequestsOptions, BatchAddResult, RequestProvider};

/// Default first-chunk size for `addRequests`'s batching contract
/// (`SPEC_FULL.md` §4.1).
pub const DEFAULT_BATCH_SIZE: usize = 1000;
const INTER_BATCH_DELAY: Duration = Duration::from_millis(250);
const MAX_BATCH_RETRIES: u32 = 5;

/// Where `fetchNext` pulls from.
enum Mode {
    QueueOnly,
    /// The static list is drained first; every item is promoted into the
    /// queue at the forefront before being handed out (`SPEC_FULL.md` §4.1
    /// tandem semantics).
    Tandem { list: Mutex<VecDeque<Request>> },
}

pub struct RequestManager {
    provider: Arc<dyn RequestProvider>,
    mode: Mode,
    handled_count: AtomicU64,
}

impl RequestManager {
    #[must_use]
    pub fn queue_only(provider: Arc<dyn RequestProvider>) -> Self {
        Self {
            provider,
            mode: Mode::QueueOnly,
            handled_count: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn tandem(provider: Arc<dyn RequestProvider>, list: Vec<Request>) -> Self {
        Self {
            provider,
            mode: Mode::Tandem {
                list: Mutex::new(VecDeque::from(list)),
            },
            handled_count: AtomicU64::new(0),
        }
    }

    /// `fetchNext() → Request | null`.
    pub async fn fetch_next(&self) -> anyhow::Result<Option<Request>> {
        match &self.mode {
            Mode::QueueOnly => Ok(self.provider.fetch_next_request().await?),
            Mode::Tandem { list } => {
                let mut list_guard = list.lock().await;
                let Some(item) = list_guard.pop_front() else {
                    drop(list_guard);
                    return Ok(self.provider.fetch_next_request().await?);
                };
                match self.provider.add_request(item.clone(), true).await {
                    Ok(()) => {
                        drop(list_guard);
                        self.provider.fetch_next_request().await.map_err(Into::into)
                    }
                    Err(err) => {
                        // List→Queue insertion failed: reclaim to the list,
                        // never drop it (`SPEC_FULL.md` §4.1 failure modes).
                        warn!(error = %err, url = %item.url, "queue insertion failed, reclaiming to list");
                        list_guard.push_front(item);
                        Ok(None)
                    }
                }
            }
        }
    }

    /// `reclaim(r, {forefront})`.
    pub async fn reclaim(&self, request: Request, forefront: bool) -> anyhow::Result<()> {
        self.provider
            .reclaim_request(request, forefront)
            .await
            .map_err(Into::into)
    }

    /// `markHandled(r)`. Idempotent per the storage provider's contract.
    pub async fn mark_handled(&self, request: Request) -> anyhow::Result<()> {
        self.provider.mark_request_handled(request).await?;
        self.handled_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// `addRequests(batch, {forefront, waitForAll}) → {added, pending}`.
    ///
    /// The first chunk of up to [`DEFAULT_BATCH_SIZE`] is inserted
    /// synchronously; any remainder is spawned as a background task that
    /// inserts the rest in further chunks with [`INTER_BATCH_DELAY`] between
    /// them, retrying a chunk up to [`MAX_BATCH_RETRIES`] times before giving
    /// up on it. If `wait_for_all` is set, the whole batch (including the
    /// background remainder) completes before returning.
    pub async fn add_requests(
        &self,
        mut batch: Vec<Request>,
        forefront: bool,
        wait_for_all: bool,
    ) -> anyhow::Result<BatchAddResult> {
        let first_len = batch.len().min(DEFAULT_BATCH_SIZE);
        let remainder: Vec<Request> = batch.split_off(first_len);
        let first_chunk = batch;

        let options = AddRequestsOptions { forefront };
        let first_result = self
            .provider
            .add_requests_batched(first_chunk, options)
            .await?;

        if remainder.is_empty() {
            return Ok(first_result);
        }

        let background = Self::insert_remainder(self.provider.clone(), remainder, options);
        if wait_for_all {
            let remainder_result = background.await?;
            Ok(BatchAddResult {
                added: first_result.added + remainder_result.added,
                pending: 0,
            })
        } else {
            tokio::spawn(background);
            Ok(BatchAddResult {
                added: first_result.added,
                pending: first_result.pending,
            })
        }
    }

    async fn insert_remainder(
        provider: Arc<dyn RequestProvider>,
        remainder: Vec<Request>,
        options: AddRequestsOptions,
    ) -> anyhow::Result<BatchAddResult> {
        let mut total_added = 0;
        for chunk in remainder.chunks(DEFAULT_BATCH_SIZE) {
            let mut attempt = 0;
            loop {
                match provider.add_requests_batched(chunk.to_vec(), options).await {
                    Ok(result) => {
                        total_added += result.added;
                        break;
                    }
                    Err(err) if attempt < MAX_BATCH_RETRIES => {
                        attempt += 1;
                        warn!(error = %err, attempt, "batched insert failed, backing off");
                        tokio::time::sleep(INTER_BATCH_DELAY * attempt).await;
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            tokio::time::sleep(INTER_BATCH_DELAY).await;
        }
        Ok(BatchAddResult {
            added: total_added,
            pending: 0,
        })
    }

    pub async fn is_empty(&self) -> anyhow::Result<bool> {
        let provider_empty = self.provider.is_empty().await?;
        match &self.mode {
            Mode::QueueOnly => Ok(provider_empty),
            Mode::Tandem { list } => Ok(provider_empty && list.lock().await.is_empty()),
        }
    }

    pub async fn is_finished(&self) -> anyhow::Result<bool> {
        let provider_finished = self.provider.is_finished().await?;
        match &self.mode {
            Mode::QueueOnly => Ok(provider_finished),
            Mode::Tandem { list } => Ok(provider_finished && list.lock().await.is_empty()),
        }
    }

    #[must_use]
    pub fn handled_count(&self) -> u64 {
        self.handled_count.load(Ordering::Relaxed)
    }

    /// Zeroes the in-memory handled-request tally, for `purgeRequestQueue`'s
    /// "reset counters" step (`SPEC_FULL.md` §4.9) on a rerun against a
    /// freshly reopened queue.
    pub fn reset_handled_count(&self) {
        self.handled_count.store(0, Ordering::Relaxed);
    }

    pub async fn get_pending_count(&self) -> anyhow::Result<u64> {
        Ok(self.provider.get_pending_count().await?)
    }

    pub async fn get_total_count(&self) -> anyhow::Result<u64> {
        Ok(self.provider.get_total_count().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryRequestProvider;

    #[tokio::test]
    async fn tandem_promotes_list_items_to_queue_forefront() {
        let provider = Arc::new(InMemoryRequestProvider::new());
        provider
            .add_request(Request::new("http://a/already-queued"), false)
            .await
            .unwrap();
        let manager = RequestManager::tandem(provider, vec![Request::new("http://a/from-list")]);

        let next = manager.fetch_next().await.unwrap().unwrap();
        assert_eq!(next.url, "http://a/from-list");
    }

    #[tokio::test]
    async fn add_requests_first_chunk_is_synchronous() {
        let provider = Arc::new(InMemoryRequestProvider::new());
        let manager = RequestManager::queue_only(provider.clone());
        let batch = vec![Request::new("http://a/1"), Request::new("http://a/2")];
        let result = manager.add_requests(batch, false, false).await.unwrap();
        assert_eq!(result.added, 2);
        assert_eq!(provider.get_total_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn mark_handled_increments_handled_count() {
        let provider = Arc::new(InMemoryRequestProvider::new());
        let manager = RequestManager::queue_only(provider);
        let request = Request::new("http://a/1");
        manager.mark_handled(request).await.unwrap();
        assert_eq!(manager.handled_count(), 1);
    }

    #[tokio::test]
    async fn reset_handled_count_zeroes_the_tally() {
        let provider = Arc::new(InMemoryRequestProvider::new());
        let manager = RequestManager::queue_only(provider);
        manager.mark_handled(Request::new("http://a/1")).await.unwrap();
        manager.reset_handled_count();
        assert_eq!(manager.handled_count(), 0);
    }
}
