#![cfg(feature = "blocking")]

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use baselog_http::{
    blocking::BaselogClient, ApiConfig, BaselogError, ClientOptions, EventModel, FailureKind,
    LogLevel, LogModel, OutboundRequest, Outcome, RetryPolicy,
};
use serde_json::{json, Value as JsonValue};

#[derive(Clone)]
struct MockState {
    responses: Arc<Mutex<VecDeque<(StatusCode, JsonValue)>>>,
    hits: Arc<AtomicUsize>,
}

async fn scripted_handler(State(state): State<MockState>) -> (StatusCode, Json<JsonValue>) {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let (status, body) = state
        .responses
        .lock()
        .expect("response queue mutex must not be poisoned")
        .pop_front()
        .unwrap_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"error": "no mock response available"}),
        ));
    (status, Json(body))
}

async fn maintenance_handler(State(state): State<MockState>) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [(header::RETRY_AFTER, "3600")],
        Json(json!({"error": "maintenance"})),
    )
}

async fn start_server(
    responses: Vec<(StatusCode, JsonValue)>,
) -> (String, Arc<AtomicUsize>, tokio::task::JoinHandle<()>) {
    let state = MockState {
        responses: Arc::new(Mutex::new(responses.into())),
        hits: Arc::new(AtomicUsize::new(0)),
    };
    let app = Router::new()
        .route("/projects/logs", post(scripted_handler))
        .route("/health", get(scripted_handler))
        .route("/maintenance", post(maintenance_handler))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("mock server must run");
    });
    (format!("http://{address}"), state.hits, task)
}

/// Mock server on its own runtime so the test thread stays free of any
/// runtime context.
struct TestServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    _runtime: tokio::runtime::Runtime,
}

impl TestServer {
    fn spawn(responses: Vec<(StatusCode, JsonValue)>) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("server runtime must build");
        let (base_url, hits, _task) = runtime.block_on(start_server(responses));
        Self {
            base_url,
            hits,
            _runtime: runtime,
        }
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

fn sample_log() -> LogModel {
    LogModel::new(LogLevel::Warning, "disk almost full").expect("log must be valid")
}

#[test]
fn send_log_blocks_until_delivered() {
    let server = TestServer::spawn(vec![(StatusCode::OK, json!({"id": "abc"}))]);
    let client = BaselogClient::new(&server.base_url, "test-key").expect("client must build");

    match client.send_log(&sample_log()) {
        Outcome::Success(response) => {
            assert_eq!(response.body, json!({"id": "abc"}));
            assert_eq!(response.attempts, 1);
        }
        other => panic!("expected success, got {other:?}"),
    }
    assert_eq!(server.hits(), 1);
}

#[test]
fn retries_match_async_client() {
    let server = TestServer::spawn(vec![
        (StatusCode::SERVICE_UNAVAILABLE, json!({"error": "busy"})),
        (StatusCode::OK, json!({"id": "abc"})),
    ]);
    let client = BaselogClient::from_config(
        ApiConfig::new("test-key")
            .with_base_url(server.base_url.clone())
            .with_options(ClientOptions::default().with_retry(
                RetryPolicy::default().with_backoff_factor(0.01),
            )),
    )
    .expect("client must build");

    let outcome = client.send_log(&sample_log());

    assert!(outcome.is_success());
    assert_eq!(server.hits(), 2);
}

#[test]
fn health_check_reports_status() {
    let server = TestServer::spawn(vec![(StatusCode::OK, json!({"status": "ok"}))]);
    let client = BaselogClient::new(&server.base_url, "test-key").expect("client must build");

    assert!(client.health_check());
    assert!(!client.probe("/missing"));
}

#[test]
fn close_is_idempotent_and_shared_by_clones() {
    let server = TestServer::spawn(vec![]);
    let client = BaselogClient::new(&server.base_url, "test-key").expect("client must build");
    let clone = client.clone();

    client.close();
    client.close();

    assert!(clone.is_closed());
    let outcome = clone.send_log(&sample_log());
    assert_eq!(
        outcome.failure().map(|failure| failure.kind),
        Some(FailureKind::ConnectivityFailure)
    );
    assert!(!clone.health_check());
    assert_eq!(server.hits(), 0);
}

#[test]
fn close_wakes_call_waiting_to_retry() {
    let server = TestServer::spawn(vec![]);
    let client = BaselogClient::new(&server.base_url, "test-key").expect("client must build");
    let request =
        OutboundRequest::post_json("/maintenance", &json!({})).expect("payload must serialize");

    let started = Instant::now();
    let waiting = thread::spawn({
        let client = client.clone();
        move || client.execute(request)
    });
    thread::sleep(Duration::from_millis(300));
    client.close();

    let outcome = waiting.join().expect("caller thread must not panic");
    assert!(started.elapsed() < Duration::from_secs(3));
    let failure = outcome.failure().expect("must fail");
    assert_eq!(failure.kind, FailureKind::ConnectivityFailure);
    assert_eq!(failure.attempts, 1);
    assert_eq!(server.hits(), 1);
}

#[test]
fn send_event_is_not_supported() {
    let client = BaselogClient::new("http://127.0.0.1:9", "test-key").expect("client must build");
    let payload = json!({"order": 42})
        .as_object()
        .cloned()
        .expect("payload must be an object");
    let event = EventModel::new("order.created", payload, "shop").expect("event must be valid");

    assert!(matches!(
        client.send_event(&event),
        Outcome::NotSupported { .. }
    ));
}

#[test]
fn empty_api_key_is_rejected() {
    let result = BaselogClient::new("http://127.0.0.1:9", "   ");
    assert!(matches!(result, Err(BaselogError::Configuration(_))));
}

#[tokio::test]
async fn current_thread_runtime_is_refused() {
    let client = BaselogClient::new("http://127.0.0.1:9", "test-key").expect("client must build");

    let outcome = client.send_log(&sample_log());

    let failure = outcome.failure().expect("must refuse to block");
    assert_eq!(failure.kind, FailureKind::Runtime);
    assert!(!client.health_check());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn multi_thread_runtime_is_supported() {
    let (base_url, hits, _task) =
        start_server(vec![(StatusCode::OK, json!({"id": "abc"}))]).await;
    let client = BaselogClient::new(&base_url, "test-key").expect("client must build");

    let outcome = client.send_log(&sample_log());

    assert!(outcome.is_success());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
