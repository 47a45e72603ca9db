//! The per-attempt `CrawlingContext` handed to user handlers.
//!
//! Per the design note in `SPEC_FULL.md` §9, the dynamic, closure-heavy
//! context from the distilled spec is modeled here as a value holding the
//! Request, an optional Session, and a vtable (`ContextOps`) for the bound
//! helpers (`enqueueLinks`, `addRequests`, `pushData`, `sendRequest`,
//! `useState`, `getKeyValueStore`). The vtable is implemented by the task
//! pipeline, which is the only thing that knows how to inject crawl depth,
//! enforce `maxCrawlDepth`/`maxRequestsPerCrawl`, and route through the
//! configured transport.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::model::request::Request;
use crate::model::session::Session;
use crate::storage::traits::{BatchAddResult, KeyValueStore};
use crate::storage::transport::TransportResponse;

/// Bound helpers available to a user handler through [`CrawlingContext`].
/// Implemented by [`crate::scheduler::pipeline::TaskPipeline`].
#[async_trait]
pub trait ContextOps: Send + Sync {
    /// Enqueues links discovered while handling `parent`. Depth injection
    /// and `maxCrawlDepth`/`maxRequestsPerCrawl` clamping are the
    /// implementation's responsibility.
    async fn enqueue_links(
        &self,
        parent: &Request,
        urls: Vec<String>,
        forefront: bool,
    ) -> anyhow::Result<BatchAddResult>;

    async fn add_requests(
        &self,
        parent: &Request,
        requests: Vec<Request>,
        forefront: bool,
    ) -> anyhow::Result<BatchAddResult>;

    async fn push_data(&self, data: serde_json::Value) -> anyhow::Result<()>;

    async fn use_state(&self, default: serde_json::Value) -> anyhow::Result<serde_json::Value>;

    async fn send_request(
        &self,
        request: &Request,
        session: Option<&Session>,
    ) -> anyhow::Result<TransportResponse>;

    async fn get_key_value_store(
        &self,
        id_or_name: Option<&str>,
    ) -> anyhow::Result<Arc<dyn KeyValueStore>>;
}

/// Per-attempt, ephemeral context. Lives only for the duration of one
/// handler invocation (`SPEC_FULL.md` §3, "Contexts live for one attempt").
pub struct CrawlingContext {
    pub id: String,
    pub request: Request,
    pub session: Option<Session>,
    pub proxy_info: Option<String>,
    ops: Arc<dyn ContextOps>,
    /// Final URL of the last `sendRequest` call, shared with the pipeline
    /// that owns this context so it can read the redirect target back after
    /// the handler returns (the context itself is consumed by then).
    loaded_url: Arc<Mutex<Option<String>>>,
}

impl CrawlingContext {
    #[must_use]
    pub fn new(request: Request, session: Option<Session>, ops: Arc<dyn ContextOps>) -> Self {
        let proxy_info = session.as_ref().and_then(|s| s.proxy_info.clone());
        Self {
            id: Uuid::new_v4().to_string(),
            request,
            session,
            proxy_info,
            ops,
            loaded_url: Arc::new(Mutex::new(None)),
        }
    }

    /// A clone of the final-URL slot, for the owning pipeline to read once
    /// the handler that consumed this context has returned.
    #[must_use]
    pub fn loaded_url_handle(&self) -> Arc<Mutex<Option<String>>> {
        self.loaded_url.clone()
    }

    /// A tracing span scoped to this attempt; the `log` field of the
    /// distilled spec's context.
    #[must_use]
    pub fn log(&self) -> tracing::Span {
        tracing::info_span!("crawl_attempt", request_id = %self.request.id, url = %self.request.url)
    }

    pub async fn enqueue_links(
        &self,
        urls: Vec<String>,
        forefront: bool,
    ) -> anyhow::Result<BatchAddResult> {
        self.ops.enqueue_links(&self.request, urls, forefront).await
    }

    pub async fn add_requests(
        &self,
        requests: Vec<Request>,
        forefront: bool,
    ) -> anyhow::Result<BatchAddResult> {
        self.ops.add_requests(&self.request, requests, forefront).await
    }

    pub async fn push_data(&self, data: serde_json::Value) -> anyhow::Result<()> {
        self.ops.push_data(data).await
    }

    pub async fn use_state(&self, default: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        self.ops.use_state(default).await
    }

    pub async fn send_request(&self) -> anyhow::Result<TransportResponse> {
        let response = self.ops.send_request(&self.request, self.session.as_ref()).await?;
        *self.loaded_url.lock() = Some(response.final_url.clone());
        Ok(response)
    }

    pub async fn get_key_value_store(
        &self,
        id_or_name: Option<&str>,
    ) -> anyhow::Result<Arc<dyn KeyValueStore>> {
        self.ops.get_key_value_store(id_or_name).await
    }
}
