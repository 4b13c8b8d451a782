#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header::AUTHORIZATION},
};
use common::{push_body, signed_request, test_config};
use http_body_util::BodyExt;
use sync_dispatcher::{
    clock::SystemClock,
    dispatcher::{Pipeline, TriggerClient, TriggerError, TriggerResponse},
    router::build_router,
    state::AppState,
    types::SyncRequest,
};
use tower::ServiceExt;

struct NoopClient;

#[async_trait]
impl TriggerClient for NoopClient {
    async fn trigger(&self, _request: &SyncRequest) -> Result<TriggerResponse, TriggerError> {
        Ok(TriggerResponse {
            status: 200,
            body: String::new(),
        })
    }
}

fn build_app(token: Option<&str>) -> Router {
    let pipeline = Pipeline::start(
        test_config("http://127.0.0.1:9"),
        Arc::new(NoopClient),
        Arc::new(SystemClock),
    );
    build_router(AppState {
        pipeline,
        inspector_api_token: token.map(str::to_string),
    })
}

fn deliveries_request(authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri("/internal/deliveries");
    if let Some(value) = authorization {
        builder = builder.header(AUTHORIZATION, value);
    }
    builder.body(Body::empty()).unwrap()
}

async fn response_body(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// No token configured (feature disabled) - requests pass through
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn auth_disabled_allows_request_without_header() {
    let app = build_app(None);

    let response = app.oneshot(deliveries_request(None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response_body(response).await.contains("deliveries"));
}

#[tokio::test]
async fn auth_disabled_allows_request_with_any_header() {
    let app = build_app(None);

    let response = app
        .oneshot(deliveries_request(Some("Bearer random-token")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

// ─────────────────────────────────────────────────────────────────────────────
// Token configured, valid Bearer header - request allowed
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn valid_bearer_token_allows_request() {
    let app = build_app(Some("secret-api-token"));

    let response = app
        .oneshot(deliveries_request(Some("Bearer secret-api-token")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn valid_token_guards_attempts_too() {
    let app = build_app(Some("secret"));

    let request = Request::builder()
        .uri("/internal/attempts")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/internal/attempts")
        .header(AUTHORIZATION, "Bearer secret")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn valid_bearer_token_with_surrounding_whitespace_allows_request() {
    let app = build_app(Some("secret"));

    let response = app
        .oneshot(deliveries_request(Some("  Bearer secret  ")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn bearer_scheme_is_case_insensitive() {
    for header in ["bearer secret", "BeArEr secret"] {
        let response = build_app(Some("secret"))
            .oneshot(deliveries_request(Some(header)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{header}");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Token configured, missing or wrong credentials - 401
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_auth_header_returns_401() {
    let app = build_app(Some("secret"));

    let response = app.oneshot(deliveries_request(None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response_body(response).await;
    assert!(body.contains("missing"));
    assert!(body.contains("unauthorized"));
}

#[tokio::test]
async fn wrong_token_returns_401() {
    let app = build_app(Some("correct-token"));

    let response = app
        .oneshot(deliveries_request(Some("Bearer wrong-token")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response_body(response).await.contains("invalid"));
}

#[tokio::test]
async fn malformed_headers_return_401() {
    for header in ["Bearer ", "Basic dXNlcjpwYXNz", "secret"] {
        let response = build_app(Some("secret"))
            .oneshot(deliveries_request(Some(header)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{header}");
    }
}

#[tokio::test]
async fn prefix_of_token_is_rejected() {
    let app = build_app(Some("a-very-long-secret-token-here"));

    for header in ["Bearer x", "Bearer a-very-long-secret-token-her"] {
        let response = app
            .clone()
            .oneshot(deliveries_request(Some(header)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{header}");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Webhook intake and health stay open
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn webhook_and_health_unaffected_by_inspector_auth() {
    let app = build_app(Some("secret"));

    let response = app
        .clone()
        .oneshot(signed_request(
            "/webhook",
            "d-1",
            "push",
            push_body("app", "refs/heads/main", "abc123"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = Request::builder()
        .uri("/healthz")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response_body(response).await.contains("ok"));
}
