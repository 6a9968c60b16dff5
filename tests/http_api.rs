// tests/http_api.rs
#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use inkpanel::exec::{PipelineCommand, StreamLimits};
use inkpanel::service::{JobService, JobSettings, router};
use inkpanel_test_utils::with_timeout;
use serde_json::Value;
use tower::ServiceExt;

fn app(dir: &std::path::Path, body: &str) -> Router {
    let settings = JobSettings {
        normal_config: dir.join("normal.toml"),
        small_config: dir.join("small.toml"),
        dummy: false,
        workers: 3,
        session_ttl: Duration::from_secs(60),
        limits: StreamLimits::default(),
        log_poll_interval: Duration::from_millis(10),
    };
    let service = JobService::new(PipelineCommand::new("sh", ["-c", body, "pipeline"]), settings);
    router(Arc::new(service), "/panel/")
}

fn form(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("token={token}")))
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn start(app: &Router, query: &str) -> Value {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/panel/api/run?{query}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn run_log_image_round() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), "echo rendering >&2; printf '\\211PNG'");

    let started = start(&app, "mode=small&test=true").await;
    let token = started["token"].as_str().unwrap().to_string();
    assert!(!token.is_empty());

    let response = with_timeout(app.clone().oneshot(form("/panel/api/log", &token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain; charset=utf-8");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
    assert_eq!(response.headers()["x-accel-buffering"], "no");
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    let log = with_timeout(body_bytes(response)).await;
    assert_eq!(String::from_utf8(log).unwrap(), "rendering\n");

    let response = app.clone().oneshot(form("/panel/api/image", &token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(response.headers()["x-job-status"], "done");
    assert_eq!(body_bytes(response).await, b"\x89PNG");
}

#[tokio::test]
async fn invalid_mode_returns_empty_token() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), "true");

    let body = start(&app, "mode=huge").await;

    assert_eq!(body["token"], "");
    assert!(body["error"].as_str().unwrap().contains("invalid mode"));
}

#[tokio::test]
async fn unknown_token_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), "true");

    for uri in ["/panel/api/image", "/panel/api/log"] {
        let response = app.clone().oneshot(form(uri, "no-such-token")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["code"], "NOT_FOUND");
    }
}

#[tokio::test]
async fn routes_live_under_the_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), "true");

    let response = app
        .oneshot(Request::builder().uri("/api/run").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
