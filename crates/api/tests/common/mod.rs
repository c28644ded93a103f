//! Shared fixtures for API integration tests.
//!
//! Requests go straight to the router through `tower::ServiceExt::oneshot`;
//! no TCP listener is involved.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tempfile::TempDir;
use tower::ServiceExt;

use cascade_api::config::ServerConfig;
use cascade_api::router::build_app_router;
use cascade_api::state::AppState;
use cascade_backend::blob_store::LocalBlobStore;
use cascade_backend::registry::BackendRegistry;
use cascade_core::backend::{BackendError, ExecutionBackend, RunHandle};
use cascade_core::template::RenderedTemplate;
use cascade_engine::{DispatchEngine, TemplateService};

/// Run environment served by the test backend.
pub const RUN_ENV: &str = "k8sm01";

pub const JOB_TEMPLATE: &str = r#"
apiVersion: batch/v1
kind: Job
metadata:
  name: placeholder
spec:
  template:
    spec:
      restartPolicy: Never
      containers:
        - name: main
          image: "${image}"
          args: ["--input", "${upstream_output}"]
"#;

const BOUNDARY: &str = "cascade-test-boundary";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        cors_origins: vec![HeaderValue::from_static("http://localhost:5173")],
        request_timeout: Duration::from_secs(30),
        shutdown_timeout: Duration::from_secs(30),
    }
}

/// Backend that records submissions and rejects run names containing
/// any configured fragment.
#[derive(Default)]
pub struct RecordingBackend {
    reject: Mutex<Vec<String>>,
    submitted: Mutex<Vec<String>>,
}

impl RecordingBackend {
    pub fn reject_runs_containing(&self, fragment: &str) {
        self.reject.lock().unwrap().push(fragment.to_string());
    }

    pub fn submitted_names(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ExecutionBackend for RecordingBackend {
    fn kind(&self) -> &'static str {
        "recording"
    }

    async fn submit(&self, rendered: &RenderedTemplate) -> Result<RunHandle, BackendError> {
        let rejected = self
            .reject
            .lock()
            .unwrap()
            .iter()
            .any(|f| rendered.run_name.contains(f.as_str()));
        if rejected {
            return Err(BackendError::Rejected {
                status: 403,
                message: "quota exceeded".to_string(),
            });
        }
        self.submitted.lock().unwrap().push(rendered.run_name.clone());
        Ok(RunHandle(format!("run/{}", rendered.run_name)))
    }
}

/// The application router plus the test doubles behind it.
pub struct TestApp {
    router: Router,
    pub backend: Arc<RecordingBackend>,
    _blobs: TempDir,
}

impl TestApp {
    /// A fresh handle to the router; each request consumes one.
    pub fn app(&self) -> Router {
        self.router.clone()
    }
}

/// Build the full application router with all middleware layers, backed
/// by a recording execution backend and a temporary blob store.
pub fn build_test_app(pool: PgPool) -> TestApp {
    let config = test_config();
    let blobs = tempfile::tempdir().unwrap();
    let templates = TemplateService::new(pool.clone(), Arc::new(LocalBlobStore::new(blobs.path())));

    let backend = Arc::new(RecordingBackend::default());
    let mut registry = BackendRegistry::new();
    registry.register(RUN_ENV, backend.clone());

    let engine = Arc::new(DispatchEngine::new(pool.clone(), registry, templates));
    let state = AppState::new(pool, config.clone(), engine);

    TestApp {
        router: build_app_router(state, &config),
        backend,
        _blobs: blobs,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn delete(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

async fn send_json(app: Router, method: Method, uri: &str, body: serde_json::Value) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    send_json(app, Method::POST, uri, body).await
}

pub async fn put_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    send_json(app, Method::PUT, uri, body).await
}

/// POST a single file as multipart field `field`.
pub async fn post_file(app: Router, uri: &str, field: &str, file_name: &str, content: &str) -> Response {
    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n\
         {content}\r\n\
         --{BOUNDARY}--\r\n"
    );
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Create a launchable job through the API: template uploaded and an
/// `image` tag set. Returns the job id.
pub async fn create_job(test: &TestApp, name: &str, parent_id: Option<i64>, seq: i32) -> i64 {
    let response = post_json(
        test.app(),
        "/api/v1/jobs",
        serde_json::json!({
            "name": name,
            "run_env": RUN_ENV,
            "seq": seq,
            "parent_id": parent_id,
        }),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    let id = body_json(response).await["data"]["id"].as_i64().unwrap();

    let response = post_file(
        test.app(),
        &format!("/api/v1/jobs/{id}/templates"),
        "file",
        "job.yaml",
        JOB_TEMPLATE,
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);

    let response = put_json(
        test.app(),
        &format!("/api/v1/jobs/{id}/tags"),
        serde_json::json!({"tags": [{"name": "image", "value": format!("{name}:1")}]}),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::OK);

    id
}
