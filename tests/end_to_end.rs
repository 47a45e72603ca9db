//! End-to-end scenarios wiring every scheduler component together through
//! the public API, matching the literal scenarios of `SPEC_FULL.md` §8.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crawl_scheduler::{
    AutoscaledPool, DomainPacer, LifecycleController, Request, RequestManager, RequestProvider,
    RequestTransport, RobotsCache, RobotsFetcher, SchedulerConfig, SchedulerError,
    SchedulerEventBus, SessionPool, SkippedReason, Statistics, StorageClient, TaskPipeline,
};
use crawl_scheduler::storage::memory::{
    InMemoryKeyValueStore, InMemoryRequestProvider, InMemoryStorageClient,
};
use crawl_scheduler::storage::transport::{RobotsPolicy, TransportResponse};

/// Routes the crate's `tracing` output through the test harness's captured
/// writer, mirroring how the teacher's binaries wire up
/// `tracing_subscriber::fmt` at startup. `try_init` tolerates being called
/// from more than one test in the same binary.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct EchoTransport;

#[async_trait]
impl RequestTransport for EchoTransport {
    async fn send(
        &self,
        request: &Request,
        _cookies: &[(String, String)],
        _proxy: Option<&str>,
    ) -> anyhow::Result<TransportResponse> {
        Ok(TransportResponse {
            status: 200,
            headers: Default::default(),
            body: Vec::new(),
            final_url: request.url.clone(),
        })
    }
}

struct DenyPrivateFetcher;

#[async_trait]
impl RobotsFetcher for DenyPrivateFetcher {
    async fn fetch(&self, _origin: &str) -> anyhow::Result<RobotsPolicy> {
        Ok(RobotsPolicy {
            disallowed_prefixes: vec!["/private".to_string()],
        })
    }
}

/// Assembles a full C1-C8 stack behind a [`LifecycleController`], mirroring
/// how a host application would wire the scheduler in production, minus the
/// real HTTP/storage backends (an in-memory provider stands in for both).
async fn build_controller(
    config: Arc<SchedulerConfig>,
    robots_fetcher: Option<Arc<dyn RobotsFetcher>>,
) -> (Arc<LifecycleController>, Arc<RequestManager>) {
    init_tracing();
    let provider = Arc::new(InMemoryRequestProvider::new());
    let request_manager = Arc::new(RequestManager::queue_only(provider));
    let pool = Arc::new(AutoscaledPool::new(
        config.min_concurrency,
        config.max_concurrency,
        config.max_requests_per_minute,
    ));
    let kv = Arc::new(InMemoryKeyValueStore::open(None).await.unwrap());
    let statistics = Arc::new(Statistics::new());
    let session_pool = if config.use_session_pool {
        Some(Arc::new(SessionPool::new(config.session_pool_options.clone())))
    } else {
        None
    };
    let robots_cache = robots_fetcher.map(RobotsCache::new).map(Arc::new);

    let pipeline = Arc::new(TaskPipeline::new(
        config.clone(),
        request_manager.clone(),
        session_pool.clone(),
        Arc::new(DomainPacer::new(Duration::from_secs(config.same_domain_delay_secs))),
        robots_cache,
        statistics.clone(),
        Arc::new(EchoTransport),
        kv.clone(),
        pool.clone(),
    ));

    let controller = Arc::new(LifecycleController::new(
        config,
        request_manager.clone(),
        session_pool,
        pipeline,
        pool,
        statistics,
        Arc::new(InMemoryStorageClient) as Arc<dyn StorageClient>,
        kv,
        Arc::new(SchedulerEventBus::new(16)),
    ));
    (controller, request_manager)
}

#[tokio::test]
async fn happy_path_never_exceeds_max_concurrency() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_observed = Arc::new(AtomicUsize::new(0));
    let in_flight_clone = in_flight.clone();
    let max_observed_clone = max_observed.clone();

    let config = Arc::new(
        SchedulerConfig::builder()
            .request_handler(move |_ctx| {
                let in_flight = in_flight_clone.clone();
                let max_observed = max_observed_clone.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_observed.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .max_concurrency(2)
            .max_request_retries(0)
            .build()
            .unwrap(),
    );
    let (controller, request_manager) = build_controller(config, None).await;
    request_manager
        .add_requests(
            vec![
                Request::new("http://a.com/1"),
                Request::new("http://a.com/2"),
                Request::new("http://a.com/3"),
            ],
            false,
            true,
        )
        .await
        .unwrap();

    let outcome = controller.run(vec![]).await.unwrap();

    assert_eq!(outcome.stats.requests_finished, 3);
    assert_eq!(outcome.stats.requests_failed, 0);
    assert!(max_observed.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn flaky_handler_succeeds_after_two_retries() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_clone = attempts.clone();

    let config = Arc::new(
        SchedulerConfig::builder()
            .request_handler(move |_ctx| {
                let attempts = attempts_clone.clone();
                async move {
                    let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                    if attempt < 2 {
                        anyhow::bail!("transient failure");
                    }
                    Ok(())
                }
            })
            .max_request_retries(3)
            .build()
            .unwrap(),
    );
    let (controller, request_manager) = build_controller(config, None).await;
    request_manager
        .add_requests(vec![Request::new("http://a.com/x")], false, true)
        .await
        .unwrap();

    let outcome = controller.run(vec![]).await.unwrap();

    assert_eq!(outcome.stats.requests_finished, 1);
    assert_eq!(outcome.stats.requests_failed, 0);
    assert!(outcome
        .stats
        .retry_histogram
        .iter()
        .any(|(bucket, count)| *bucket == 2 && *count == 1));
}

#[tokio::test]
async fn non_retryable_failure_calls_failed_request_handler_once() {
    let failed_calls = Arc::new(AtomicUsize::new(0));
    let failed_calls_clone = failed_calls.clone();

    let config = Arc::new(
        SchedulerConfig::builder()
            .request_handler(|_ctx| async {
                Err(anyhow::Error::new(SchedulerError::non_retryable(
                    "permanently rejected",
                )))
            })
            .failed_request_handler(move |_ctx, _err| {
                let failed_calls = failed_calls_clone.clone();
                async move {
                    failed_calls.fetch_add(1, Ordering::SeqCst);
                }
            })
            .build()
            .unwrap(),
    );
    let (controller, request_manager) = build_controller(config, None).await;
    request_manager
        .add_requests(vec![Request::new("http://a.com/y")], false, true)
        .await
        .unwrap();

    let outcome = controller.run(vec![]).await.unwrap();

    assert_eq!(outcome.stats.requests_failed, 1);
    assert_eq!(failed_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn same_domain_completions_are_spaced_by_the_configured_delay() {
    let completions: Arc<std::sync::Mutex<Vec<Instant>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
    let completions_clone = completions.clone();

    let config = Arc::new(
        SchedulerConfig::builder()
            .request_handler(move |_ctx| {
                let completions = completions_clone.clone();
                async move {
                    completions.lock().unwrap().push(Instant::now());
                    Ok(())
                }
            })
            .same_domain_delay_secs(1)
            .build()
            .unwrap(),
    );
    let (controller, request_manager) = build_controller(config, None).await;
    request_manager
        .add_requests(
            vec![Request::new("http://a.com/1"), Request::new("http://a.com/2")],
            false,
            true,
        )
        .await
        .unwrap();

    let outcome = controller.run(vec![]).await.unwrap();
    assert_eq!(outcome.stats.requests_finished, 2);

    let recorded = completions.lock().unwrap();
    assert_eq!(recorded.len(), 2);
    assert!(recorded[1].duration_since(recorded[0]) >= Duration::from_millis(950));
}

#[tokio::test]
async fn robots_denied_path_is_skipped_without_invoking_the_handler() {
    let handler_calls = Arc::new(AtomicUsize::new(0));
    let handler_calls_clone = handler_calls.clone();
    let skip_reasons: Arc<std::sync::Mutex<Vec<SkippedReason>>> =
        Arc::new(std::sync::Mutex::new(Vec::new()));
    let skip_reasons_clone = skip_reasons.clone();

    let config = Arc::new(
        SchedulerConfig::builder()
            .request_handler(move |_ctx| {
                let handler_calls = handler_calls_clone.clone();
                async move {
                    handler_calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .respect_robots_txt_file("test-bot")
            .on_skipped_request(Arc::new(move |_request, reason| {
                skip_reasons_clone.lock().unwrap().push(reason);
            }))
            .build()
            .unwrap(),
    );
    let (controller, request_manager) = build_controller(config, Some(Arc::new(DenyPrivateFetcher))).await;
    request_manager
        .add_requests(vec![Request::new("http://a.com/private")], false, true)
        .await
        .unwrap();

    let outcome = controller.run(vec![]).await.unwrap();

    assert_eq!(outcome.stats.requests_finished, 0);
    assert_eq!(handler_calls.load(Ordering::SeqCst), 0);
    assert_eq!(skip_reasons.lock().unwrap().as_slice(), [SkippedReason::RobotsTxt]);
}

#[tokio::test]
async fn max_requests_per_crawl_caps_handler_invocations() {
    let handler_calls = Arc::new(AtomicU64::new(0));
    let handler_calls_clone = handler_calls.clone();

    let config = Arc::new(
        SchedulerConfig::builder()
            .request_handler(move |_ctx| {
                let handler_calls = handler_calls_clone.clone();
                async move {
                    handler_calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .max_requests_per_crawl(5)
            .max_concurrency(3)
            .build()
            .unwrap(),
    );
    let (controller, request_manager) = build_controller(config, None).await;
    let requests: Vec<Request> = (0..20)
        .map(|i| Request::new(format!("http://a.com/{i}")))
        .collect();
    request_manager.add_requests(requests, false, true).await.unwrap();

    let outcome = controller.run(vec![]).await.unwrap();

    assert_eq!(handler_calls.load(Ordering::SeqCst), 5);
    assert_eq!(outcome.stats.requests_finished, 5);
}
