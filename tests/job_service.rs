// tests/job_service.rs
#![cfg(unix)]

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use inkpanel::exec::{PipelineCommand, StreamLimits};
use inkpanel::service::{JobService, JobSettings, JobStatus};
use inkpanel::types::RenderMode;
use inkpanel_test_utils::{init_tracing, with_timeout};

fn settings(dir: &Path, workers: usize, ttl: Duration) -> JobSettings {
    JobSettings {
        normal_config: dir.join("normal.toml"),
        small_config: dir.join("small.toml"),
        dummy: false,
        workers,
        session_ttl: ttl,
        limits: StreamLimits::default(),
        log_poll_interval: Duration::from_millis(10),
    }
}

fn script(body: &str) -> PipelineCommand {
    PipelineCommand::new("sh", ["-c", body, "pipeline"])
}

async fn drain_log(service: &JobService, token: &str) -> Vec<String> {
    with_timeout(async {
        service.poll_log(token).await.unwrap().collect().await
    })
    .await
}

#[tokio::test]
async fn image_and_log_are_kept_apart() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let service = JobService::new(
        script("printf 'PNG'; echo step-1 >&2; printf 'DATA'; echo step-2 >&2; exit 220"),
        settings(dir.path(), 3, Duration::from_secs(60)),
    );

    let token = service.submit(RenderMode::Normal, false).unwrap();
    let lines = drain_log(&service, &token).await;
    assert_eq!(lines, vec!["step-1", "step-2"]);

    let snapshot = service.fetch_image(&token).unwrap();
    assert_eq!(snapshot.bytes, b"PNGDATA");
    assert_eq!(snapshot.status, JobStatus::Done);

    let session = service.store().get(&token).unwrap();
    assert_eq!(session.exit().map(|e| e.exit_code()), Some(220));
}

#[tokio::test]
async fn excess_submissions_wait_for_a_worker() {
    let dir = tempfile::tempdir().unwrap();
    let service = JobService::new(
        script("sleep 0.5; echo done >&2"),
        settings(dir.path(), 1, Duration::from_secs(60)),
    );

    let first = service.submit(RenderMode::Normal, false).unwrap();
    let second = service.submit(RenderMode::Normal, false).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(service.fetch_image(&first).unwrap().status, JobStatus::Running);
    assert_eq!(service.fetch_image(&second).unwrap().status, JobStatus::Pending);

    assert_eq!(drain_log(&service, &first).await, vec!["done"]);
    assert_eq!(drain_log(&service, &second).await, vec!["done"]);
    assert_eq!(service.fetch_image(&second).unwrap().status, JobStatus::Done);
}

#[tokio::test]
async fn next_submission_sweeps_stale_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let service = JobService::new(script("true"), settings(dir.path(), 3, Duration::ZERO));

    let old = service.submit(RenderMode::Normal, false).unwrap();
    drain_log(&service, &old).await;
    tokio::time::sleep(Duration::from_millis(5)).await;

    let fresh = service.submit(RenderMode::Small, true).unwrap();

    assert!(service.store().get(&old).is_none());
    assert!(service.store().get(&fresh).is_some());
    assert!(service.fetch_image(&old).is_err());
}

#[tokio::test]
async fn missing_program_still_ends_the_log() {
    let dir = tempfile::tempdir().unwrap();
    let service = JobService::new(
        PipelineCommand::new("/nonexistent/inkpanel-render", Vec::<String>::new()),
        settings(dir.path(), 3, Duration::from_secs(60)),
    );

    let token = service.submit(RenderMode::Normal, false).unwrap();
    let lines = drain_log(&service, &token).await;

    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("failed to start pipeline"), "{}", lines[0]);
    let snapshot = service.fetch_image(&token).unwrap();
    assert!(snapshot.bytes.is_empty());
    assert_eq!(snapshot.status, JobStatus::Done);
}
