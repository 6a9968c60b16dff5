// src/service/http.rs

//! HTTP surface of the job service.

use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Form, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ConfigFile;
use crate::errors::{PanelError, Result};
use crate::exec::PipelineCommand;
use crate::service::jobs::{JobService, JobSettings};
use crate::types::RenderMode;

pub const JOB_STATUS_HEADER: &str = "x-job-status";

/// `PanelError` as an HTTP response with a JSON `{ error, code }` body.
#[derive(Debug)]
pub struct AppError(PanelError);

impl From<PanelError> for AppError {
    fn from(err: PanelError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            PanelError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            PanelError::ConfigError(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            other => {
                error!(error = %other, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let body = json!({
            "error": self.0.to_string(),
            "code": code,
        });
        (status, Json(body)).into_response()
    }
}

type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Debug, Default, Deserialize)]
pub struct RunParams {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub test: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenForm {
    #[serde(default)]
    pub token: String,
}

/// Router with every endpoint nested under `url_prefix`.
pub fn router(service: Arc<JobService>, url_prefix: &str) -> Router {
    let api = Router::new()
        .route("/api/run", get(run))
        .route("/api/log", post(log))
        .route("/api/image", post(image))
        .with_state(service);

    let prefix = normalize_prefix(url_prefix);
    let app = if prefix.is_empty() {
        api
    } else {
        Router::new().nest(&prefix, api)
    };

    app.layer(TraceLayer::new_for_http())
}

/// `""`, `"/"` → `""`; `"panel/"` → `"/panel"`.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

fn parse_bool(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

async fn run(State(service): State<Arc<JobService>>, Query(params): Query<RunParams>) -> Json<serde_json::Value> {
    let mode = params.mode.as_deref().unwrap_or_default().parse::<RenderMode>();
    let test = parse_bool(params.test.as_deref());

    let result = mode
        .map_err(PanelError::ConfigError)
        .and_then(|mode| service.submit(mode, test));

    match result {
        Ok(token) => Json(json!({ "token": token })),
        Err(e) => {
            error!(error = %e, "failed to start generation");
            Json(json!({ "token": "", "error": e.to_string() }))
        }
    }
}

async fn log(State(service): State<Arc<JobService>>, Form(form): Form<TokenForm>) -> AppResult<Response> {
    let lines = service.poll_log(&form.token).await?;
    let body = Body::from_stream(lines.map(|line| Ok::<_, Infallible>(format!("{line}\n"))));

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("x-accel-buffering", "no")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(body)
        .map_err(|e| PanelError::Other(e.into()))?;
    Ok(response)
}

async fn image(State(service): State<Arc<JobService>>, Form(form): Form<TokenForm>) -> AppResult<Response> {
    let snapshot = service.fetch_image(&form.token)?;

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "image/png")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(JOB_STATUS_HEADER, snapshot.status.as_str())
        .body(Body::from(snapshot.bytes))
        .map_err(|e| PanelError::Other(e.into()))?;
    Ok(response)
}

/// Run the job service until SIGINT / SIGTERM.
pub async fn serve(cfg: &ConfigFile, config_path: &Path) -> Result<()> {
    let command = PipelineCommand::from_config(&cfg.pipeline)?;
    let settings = JobSettings::from_section(&cfg.server, config_path);
    let service = Arc::new(JobService::new(command, settings));
    let app = router(service, &cfg.server.url_prefix);

    let listener = TcpListener::bind(&cfg.server.bind).await?;
    info!(bind = %cfg.server.bind, prefix = %cfg.server.url_prefix, "job service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("job service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_normalized() {
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix("panel/"), "/panel");
        assert_eq!(normalize_prefix("/weather/panel"), "/weather/panel");
    }

    #[test]
    fn only_truthy_strings_enable_test_mode() {
        assert!(parse_bool(Some("true")));
        assert!(parse_bool(Some("1")));
        assert!(!parse_bool(Some("false")));
        assert!(!parse_bool(Some("")));
        assert!(!parse_bool(None));
    }

    #[test]
    fn missing_session_maps_to_404() {
        let response = AppError::from(PanelError::SessionNotFound("x".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
