use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, StatusCode};
use axum::response::Response;
use axum::Router;
use sqlx::SqlitePool;
use tower::ServiceExt;

use airlock_api::config::{EngineConfig, ServerConfig};
use airlock_api::dispatch::JobDispatcher;
use airlock_api::router::build_app_router;
use airlock_api::state::AppState;
use airlock_api::ws::WsManager;
use airlock_core::PayloadSchema;
use airlock_db::models::{CallbackMode, NewJob, ResultFormat};
use airlock_db::repositories::JobRepo;
use airlock_delivery::CallbackDelivery;
use airlock_engine::{Engine, EngineError, EngineLifecycle};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5678".to_string()],
        request_timeout_secs: 30,
        database_url: "sqlite::memory:".to_string(),
        idle_timeout_secs: 20,
        poll_interval_ms: 10,
        completed_retention_days: 7,
        retention_days: 30,
        required_fields: Vec::new(),
        engine: EngineConfig {
            name: "mock".to_string(),
            command: vec!["true".to_string()],
            workdir: None,
            env: Vec::new(),
            job_dir: std::env::temp_dir(),
            output_dir: std::env::temp_dir(),
            timeout_secs: 5,
            result_marker: "[RESULT-PATH]".to_string(),
        },
    }
}

/// Fresh scratch directory for one test's engine artifacts.
pub fn artifact_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("airlock-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create artifact dir");
    dir
}

// ---------------------------------------------------------------------------
// Mock engine
// ---------------------------------------------------------------------------

/// Observable counters and switches for [`MockEngine`], shared with the
/// test body.
#[derive(Default)]
pub struct MockEngineState {
    pub loads: AtomicUsize,
    pub unloads: AtomicUsize,
    pub runs: AtomicUsize,
    pub fail_load: AtomicBool,
    pub fail_process: AtomicBool,
    /// Artificial per-run delay, for overlap probing.
    pub run_delay_ms: AtomicU64,
    /// High-water mark of concurrent `process` calls ever observed.
    pub max_concurrent_runs: AtomicUsize,
    running_now: AtomicUsize,
    /// Job ids in the order the engine received them.
    pub run_order: std::sync::Mutex<Vec<String>>,
}

/// In-process [`Engine`] that writes small real artifacts, so delivery
/// and destination-move paths operate on actual files.
pub struct MockEngine {
    pub state: Arc<MockEngineState>,
    artifact_dir: PathBuf,
}

/// Bytes every mock artifact contains.
pub const ARTIFACT_BYTES: &[u8] = b"artifact-bytes";

impl MockEngine {
    pub fn new(artifact_dir: PathBuf) -> Self {
        Self {
            state: Arc::new(MockEngineState::default()),
            artifact_dir,
        }
    }
}

#[async_trait]
impl Engine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn load(&self) -> Result<(), EngineError> {
        if self.state.fail_load.load(Ordering::SeqCst) {
            return Err(EngineError::Load("mock load refused".into()));
        }
        self.state.loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn unload(&self) {
        self.state.unloads.fetch_add(1, Ordering::SeqCst);
    }

    async fn process(
        &self,
        job_id: &str,
        _payload: &serde_json::Value,
    ) -> Result<PathBuf, EngineError> {
        self.state.run_order.lock().unwrap().push(job_id.to_string());
        let now = self.state.running_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_concurrent_runs.fetch_max(now, Ordering::SeqCst);

        let delay = self.state.run_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let result = if self.state.fail_process.load(Ordering::SeqCst) {
            Err(EngineError::Execution("synthetic engine failure".into()))
        } else {
            let path = self.artifact_dir.join(format!("{job_id}.mp4"));
            tokio::fs::write(&path, ARTIFACT_BYTES).await?;
            self.state.runs.fetch_add(1, Ordering::SeqCst);
            Ok(path)
        };

        self.state.running_now.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

// ---------------------------------------------------------------------------
// App / broker assembly
// ---------------------------------------------------------------------------

/// `AppState` over a mock engine, mirroring the assembly in `main.rs`.
pub fn app_state(pool: SqlitePool, config: ServerConfig) -> AppState {
    let engine = MockEngine::new(artifact_dir());
    let lifecycle = Arc::new(EngineLifecycle::new(
        Arc::new(engine),
        Duration::from_secs(config.idle_timeout_secs),
    ));

    AppState {
        pool,
        schema: Arc::new(PayloadSchema::new(config.required_fields.clone())),
        config: Arc::new(config),
        ws_manager: Arc::new(WsManager::new()),
        lifecycle,
    }
}

/// Build the application router with the production middleware stack.
pub fn build_test_app(pool: SqlitePool) -> Router {
    build_test_app_with(pool, test_config())
}

/// Same as [`build_test_app`] but with a custom configuration.
pub fn build_test_app_with(pool: SqlitePool, config: ServerConfig) -> Router {
    let state = app_state(pool, config);
    let config = Arc::clone(&state.config);
    build_app_router(state, &config)
}

/// A dispatcher wired to a mock engine plus the state to observe it with.
pub struct TestBroker {
    pub state: AppState,
    pub dispatcher: JobDispatcher,
    pub engine: Arc<MockEngineState>,
}

/// Assemble a broker around one pool: shared lifecycle and subscriber
/// registry between the dispatcher and the `AppState`, exactly as in
/// `main.rs`, with a fast poll interval.
pub fn test_broker(pool: SqlitePool, idle_timeout: Duration) -> TestBroker {
    let engine = MockEngine::new(artifact_dir());
    let engine_state = Arc::clone(&engine.state);
    let lifecycle = Arc::new(EngineLifecycle::new(Arc::new(engine), idle_timeout));
    let ws_manager = Arc::new(WsManager::new());
    let config = test_config();

    let state = AppState {
        pool: pool.clone(),
        schema: Arc::new(PayloadSchema::new(config.required_fields.clone())),
        config: Arc::new(config),
        ws_manager: Arc::clone(&ws_manager),
        lifecycle: Arc::clone(&lifecycle),
    };

    let dispatcher = JobDispatcher::new(
        pool,
        lifecycle,
        ws_manager,
        Arc::new(CallbackDelivery::new()),
    )
    .with_poll_interval(Duration::from_millis(10));

    TestBroker {
        state,
        dispatcher,
        engine: engine_state,
    }
}

/// Step the dispatcher until the queue is empty, bounded by `max_cycles`.
pub async fn drain_queue(broker: &TestBroker, max_cycles: usize) {
    for _ in 0..max_cycles {
        broker.dispatcher.run_cycle().await.expect("dispatch cycle");
        let counts = JobRepo::counts(&broker.state.pool).await.expect("queue counts");
        if counts.pending == 0 && counts.processing == 0 {
            return;
        }
    }
    panic!("Queue did not drain within {max_cycles} cycles");
}

// ---------------------------------------------------------------------------
// Job builders
// ---------------------------------------------------------------------------

pub fn push_job(payload: serde_json::Value) -> NewJob {
    NewJob {
        payload,
        callback_mode: CallbackMode::Push,
        callback_target: None,
        result_format: ResultFormat::FilePath,
        destination: None,
    }
}

pub fn callback_job(url: &str, result_format: ResultFormat) -> NewJob {
    NewJob {
        payload: serde_json::json!({ "prompt": "sunset over water" }),
        callback_mode: CallbackMode::Callback,
        callback_target: Some(url.to_string()),
        result_format,
        destination: None,
    }
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Issue a GET request against the app.
pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Issue a POST request with a JSON body against the app.
pub async fn post_json(app: Router, uri: &str, body: &serde_json::Value) -> Response {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    use http_body_util::BodyExt;

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Substring search over raw bytes (multipart bodies are not UTF-8).
pub fn bytes_contain(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

// ---------------------------------------------------------------------------
// Callback capture server
// ---------------------------------------------------------------------------

/// One request received by the [`CaptureServer`].
#[derive(Clone)]
pub struct CapturedRequest {
    pub content_type: String,
    pub body: Vec<u8>,
}

#[derive(Clone)]
struct CaptureState {
    status: StatusCode,
    requests: Arc<tokio::sync::Mutex<Vec<CapturedRequest>>>,
}

/// Minimal HTTP consumer standing in for an external callback endpoint:
/// records every request it receives and answers with a fixed status.
pub struct CaptureServer {
    pub addr: std::net::SocketAddr,
    requests: Arc<tokio::sync::Mutex<Vec<CapturedRequest>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl CaptureServer {
    pub async fn start(status: StatusCode) -> Self {
        let requests = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let state = CaptureState {
            status,
            requests: Arc::clone(&requests),
        };
        let app = Router::new().fallback(capture).with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            requests,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().await.clone()
    }
}

impl Drop for CaptureServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn capture(State(state): State<CaptureState>, request: Request) -> StatusCode {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .unwrap_or_default();

    state.requests.lock().await.push(CapturedRequest {
        content_type,
        body: body.to_vec(),
    });
    state.status
}
