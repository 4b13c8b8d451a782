#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, Request, StatusCode, header::AUTHORIZATION},
    routing::post,
};
use http_body_util::BodyExt;
use serde_json::Value;
use sync_dispatcher::{
    dispatcher::{DispatcherConfig, parse_targets, sign},
    types::{DeliveryOutcome, DeliveryRecord},
};

pub const SECRET: &str = "it-is-a-secret";

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub app: String,
    pub body: Value,
    pub authorization: Option<String>,
}

impl RecordedCall {
    pub fn info(&self, name: &str) -> Option<String> {
        self.body["infos"]
            .as_array()?
            .iter()
            .find(|info| info["name"] == name)
            .and_then(|info| info["value"].as_str())
            .map(str::to_string)
    }
}

#[derive(Clone)]
struct EngineState {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    statuses: Arc<Vec<u16>>,
    delay: Duration,
}

/// Stand-in for the reconciliation engine's sync endpoint.
pub struct FakeEngine {
    pub base_url: String,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl FakeEngine {
    /// Answers the n-th call with `statuses[n]` (the last status repeats; empty means 200)
    /// after sleeping `delay`.
    pub async fn start(delay: Duration, statuses: Vec<u16>) -> Self {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let state = EngineState {
            calls: Arc::clone(&calls),
            statuses: Arc::new(statuses),
            delay,
        };
        let app = Router::new()
            .route("/api/v1/applications/:app/sync", post(sync))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake engine");
        let addr = listener.local_addr().expect("fake engine addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fake engine");
        });

        Self {
            base_url: format!("http://{addr}"),
            calls,
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

async fn sync(
    State(state): State<EngineState>,
    Path(app): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    let index = {
        let mut calls = state.calls.lock().unwrap();
        calls.push(RecordedCall {
            app,
            body,
            authorization: headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        });
        calls.len() - 1
    };
    let status = state
        .statuses
        .get(index)
        .or(state.statuses.last())
        .copied()
        .unwrap_or(200);
    tokio::time::sleep(state.delay).await;
    StatusCode::from_u16(status).unwrap()
}

pub fn test_config(base_url: &str) -> DispatcherConfig {
    let targets = parse_targets("app@main=T, org/mono@main:services/api=api").unwrap();
    let mut config = DispatcherConfig::new(SECRET, base_url, targets);
    config.settle = Duration::ZERO;
    config.debounce = Duration::from_secs(5);
    config.retry.base_delay = Duration::from_millis(10);
    config.retry.jitter = 0.0;
    config.shutdown_grace = Duration::from_millis(500);
    config
}

pub fn push_body(repository: &str, git_ref: &str, sha: &str) -> Vec<u8> {
    serde_json::json!({
        "ref": git_ref,
        "after": sha,
        "repository": { "full_name": repository, "name": repository },
    })
    .to_string()
    .into_bytes()
}

pub fn signed_request(path: &str, delivery_id: &str, event: &str, body: Vec<u8>) -> Request<Body> {
    let signature = sign(SECRET.as_bytes(), &body);
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .header("x-github-event", event)
        .header("x-github-delivery", delivery_id)
        .header("x-hub-signature-256", signature)
        .body(Body::from(body))
        .unwrap()
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Polls `check` every 10ms until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn count_outcomes<F>(records: &[DeliveryRecord], predicate: F) -> usize
where
    F: Fn(&DeliveryOutcome) -> bool,
{
    records
        .iter()
        .filter(|record| predicate(&record.outcome))
        .count()
}
