use crate::backend::{CountingBackend, MemoryBackend};
use crate::counter::{WindowResult, WindowedCounter};
use crate::error::{BackendError, DeliveryError};
use crate::ingest::IngestServer;
use crate::scheduler::WindowScheduler;
use crate::sink::{CallbackClient, HttpCallbackSink, ResultSink, TopicSink};
use async_trait::async_trait;
use chrono::Utc;
use flowstore_core::StoreError;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::CONTENT_TYPE;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use mockall::*;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

mock! {
    pub Sink {}
    #[async_trait]
    impl ResultSink for Sink {
        async fn deliver(&self, result: &WindowResult) -> Result<(), DeliveryError>;
    }
}

mock! {
    pub Backend {}
    #[async_trait]
    impl CountingBackend for Backend {
        async fn insert(&self, key: &str) -> Result<(), BackendError>;
        async fn retire(&self) -> Result<WindowResult, BackendError>;
        async fn running_count(&self) -> Result<u64, BackendError>;
    }
}

const INTERVAL: Duration = Duration::from_secs(60);
const DELIVERY_TIMEOUT: Duration = Duration::from_millis(500);
const PATH: &str = "/api/verve/accept";

fn store_failure() -> BackendError {
    BackendError::Store(StoreError::Pool("no connection available".to_string()))
}

fn client() -> CallbackClient {
    CallbackClient::new(Duration::from_secs(2)).unwrap()
}

#[derive(Debug)]
struct Captured {
    path: String,
    content_type: Option<String>,
    body: serde_json::Value,
}

/// Serves every request with `status` and forwards what it received.
async fn capture_server(status: StatusCode) -> (SocketAddr, mpsc::UnboundedReceiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
                    let tx = tx.clone();
                    async move {
                        let path = req.uri().path().to_string();
                        let content_type = req
                            .headers()
                            .get(CONTENT_TYPE)
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        let bytes = req.into_body().collect().await?.to_bytes();
                        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
                        let _ = tx.send(Captured {
                            path,
                            content_type,
                            body,
                        });

                        let mut resp = Response::new(Full::new(Bytes::new()));
                        *resp.status_mut() = status;
                        Ok::<_, hyper::Error>(resp)
                    }
                });
                let _ = ConnBuilder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), svc)
                    .await;
            });
        }
    });

    (addr, rx)
}

async fn next_capture(rx: &mut mpsc::UnboundedReceiver<Captured>) -> Captured {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_failed_delivery_does_not_delay_next_window() {
    let counter = Arc::new(WindowedCounter::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let mut sink = MockSink::new();
    {
        let calls = calls.clone();
        sink.expect_deliver().times(2).returning(move |result| {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 => {
                    assert_eq!(result.unique_count, 2);
                    Err(DeliveryError::UnexpectedStatus(503))
                }
                _ => {
                    assert_eq!(result.unique_count, 1);
                    Ok(())
                }
            }
        });
    }

    let scheduler = Arc::new(WindowScheduler::new(
        Arc::new(MemoryBackend::new(counter.clone())),
        Arc::new(sink),
        INTERVAL,
        DELIVERY_TIMEOUT,
    ));
    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    let task = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run(crate::shutdown::wait_for(stop_rx)).await })
    };

    counter.insert("a");
    counter.insert("b");
    tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    counter.insert("c");
    tokio::time::sleep(INTERVAL).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    stop_tx.send_replace(true);
    task.await.unwrap();
}

#[tokio::test]
async fn test_backend_retire_error_skips_delivery() {
    let mut backend = MockBackend::new();
    let mut seq = Sequence::new();
    backend
        .expect_retire()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Err(store_failure()));
    backend
        .expect_retire()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Ok(WindowResult::new(Utc::now(), 4)));

    let mut sink = MockSink::new();
    sink.expect_deliver()
        .withf(|result| result.unique_count == 4)
        .times(1)
        .returning(|_| Ok(()));

    let scheduler = WindowScheduler::new(Arc::new(backend), Arc::new(sink), INTERVAL, DELIVERY_TIMEOUT);
    assert!(scheduler.close_window().await.is_none());
    assert_ok!(scheduler.close_window().await.unwrap().await);
}

struct SlowSink {
    finished: AtomicBool,
}

#[async_trait]
impl ResultSink for SlowSink {
    async fn deliver(&self, _result: &WindowResult) -> Result<(), DeliveryError> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_sink_is_cut_off_by_timeout() {
    let counter = Arc::new(WindowedCounter::new());
    let sink = Arc::new(SlowSink {
        finished: AtomicBool::new(false),
    });
    let scheduler = WindowScheduler::new(
        Arc::new(MemoryBackend::new(counter.clone())),
        sink.clone(),
        INTERVAL,
        DELIVERY_TIMEOUT,
    );

    counter.insert("a");
    let started = tokio::time::Instant::now();
    scheduler.close_window().await.unwrap().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!sink.finished.load(Ordering::SeqCst));

    counter.insert("b");
    assert_eq!(counter.running_count(), 1);
    assert!(scheduler.close_window().await.is_some());
}

#[tokio::test]
async fn test_ingest_backend_failure_returns_500() {
    let mut backend = MockBackend::new();
    backend.expect_insert().returning(|_| Err(store_failure()));
    let server = IngestServer::new(Arc::new(backend), None, PATH);

    let req = Request::get(format!("{PATH}?id=a")).body(()).unwrap();
    let resp = server.handle(req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"failed");
}

#[tokio::test]
async fn test_ingest_does_not_touch_backend_for_empty_id() {
    let mut backend = MockBackend::new();
    backend.expect_insert().never();
    let server = IngestServer::new(Arc::new(backend), None, PATH);

    let req = Request::get(format!("{PATH}?id=")).body(()).unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ingest_echo_posts_running_count() {
    let (addr, mut captured) = capture_server(StatusCode::OK).await;
    let counter = Arc::new(WindowedCounter::new());
    counter.insert("earlier");
    let server = IngestServer::new(Arc::new(MemoryBackend::new(counter)), Some(client()), PATH);

    let endpoint = format!("http://{addr}/echo");
    let query: String = form_urlencoded::Serializer::new(String::new())
        .append_pair("id", "fresh")
        .append_pair("endpoint", &endpoint)
        .finish();
    let resp = server.handle(Request::get(format!("{PATH}?{query}")).body(()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let echo = next_capture(&mut captured).await;
    assert_eq!(echo.path, "/echo");
    assert_eq!(echo.content_type.as_deref(), Some("application/json"));
    assert_eq!(echo.body["unique_count"], 2);
    assert!(echo.body["timestamp"].is_string());
}

#[tokio::test]
async fn test_echo_disabled_sends_nothing() {
    let mut backend = MockBackend::new();
    backend.expect_insert().times(1).returning(|_| Ok(()));
    backend.expect_running_count().never();
    let server = IngestServer::new(Arc::new(backend), None, PATH);

    let req = Request::get(format!("{PATH}?id=a&endpoint=http%3A%2F%2F127.0.0.1%3A9%2F"))
        .body(())
        .unwrap();
    assert_eq!(server.handle(req).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_http_sink_posts_result() {
    let (addr, mut captured) = capture_server(StatusCode::OK).await;
    let sink = HttpCallbackSink::new(client(), &format!("http://{addr}/windows"));

    assert_ok!(sink.deliver(&WindowResult::new(Utc::now(), 9)).await);
    let request = next_capture(&mut captured).await;
    assert_eq!(request.path, "/windows");
    assert_eq!(request.body["unique_count"], 9);
}

#[tokio::test]
async fn test_http_sink_maps_status_codes() {
    let result = WindowResult::new(Utc::now(), 1);
    let cases = [
        (StatusCode::NOT_FOUND, "invalid endpoint"),
        (StatusCode::BAD_REQUEST, "bad request"),
        (StatusCode::SERVICE_UNAVAILABLE, "unexpected status"),
    ];

    for (status, case) in cases {
        let (addr, _captured) = capture_server(status).await;
        let sink = HttpCallbackSink::new(client(), &format!("http://{addr}/windows"));
        let err = assert_err!(sink.deliver(&result).await);
        match (status, err) {
            (StatusCode::NOT_FOUND, DeliveryError::InvalidEndpoint(_)) => {}
            (StatusCode::BAD_REQUEST, DeliveryError::BadRequest(_)) => {}
            (StatusCode::SERVICE_UNAVAILABLE, DeliveryError::UnexpectedStatus(503)) => {}
            (_, other) => panic!("{case}: unexpected error {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_http_sink_connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let sink = HttpCallbackSink::new(client(), &format!("http://{addr}/windows"));
    let err = assert_err!(sink.deliver(&WindowResult::new(Utc::now(), 1)).await);
    assert!(matches!(err, DeliveryError::ConnectionRefused(_)), "{err:?}");
}

#[tokio::test]
async fn test_topic_sink_produces_through_rest_proxy() {
    let (addr, mut captured) = capture_server(StatusCode::OK).await;
    let sink = TopicSink::new(client(), &format!("http://{addr}"), "flow.unique.entries");

    assert_ok!(sink.deliver(&WindowResult::new(Utc::now(), 12)).await);
    let request = next_capture(&mut captured).await;
    assert_eq!(request.path, "/topics/flow.unique.entries");
    assert_eq!(
        request.content_type.as_deref(),
        Some("application/vnd.kafka.json.v2+json")
    );
    assert_eq!(request.body["records"][0]["value"]["unique_count"], 12);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ingest_counts_every_key_once() {
    const KEYS: usize = 2_000;

    let counter = Arc::new(WindowedCounter::new());
    let server = Arc::new(IngestServer::new(
        Arc::new(MemoryBackend::new(counter.clone())),
        None,
        PATH,
    ));

    let requests = (0..KEYS).map(|i| {
        let server = server.clone();
        tokio::spawn(async move {
            let req = Request::get(format!("{PATH}?id=key-{i}")).body(()).unwrap();
            server.handle(req).await.status()
        })
    });
    let retirer = {
        let counter = counter.clone();
        tokio::task::spawn_blocking(move || (0..50).map(|_| counter.retire().unique_count).sum::<u64>())
    };

    let statuses = futures::future::join_all(requests).await;
    let retired = retirer.await.unwrap();
    assert!(statuses.into_iter().all(|s| s.unwrap() == StatusCode::OK));

    assert_eq!(retired + counter.retire().unique_count, KEYS as u64);
}
