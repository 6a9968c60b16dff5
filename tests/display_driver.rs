// tests/display_driver.rs
#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use inkpanel::display::{DisplayDriver, DisplaySettings, NOTIFY_THRESHOLD, Verdict};
use inkpanel::exec::{PipelineCommand, StreamLimits};
use inkpanel::timing::TimingController;
use inkpanel::types::RenderFlags;
use inkpanel_test_utils::fakes::{FakeShell, RecordingNotifier};
use inkpanel_test_utils::{init_tracing, with_timeout};

fn settings(dir: &Path, one_shot: bool) -> DisplaySettings {
    DisplaySettings {
        config_path: dir.join("inkpanel.toml"),
        flags: RenderFlags::default(),
        one_shot,
        liveness_file: dir.join("state").join("healthz"),
        connect_attempts: 3,
        connect_retry: Duration::from_millis(1),
        limits: StreamLimits::default(),
        failure_wait: Duration::from_millis(10),
        one_shot_wait: Duration::from_millis(10),
        notify_threshold: NOTIFY_THRESHOLD,
    }
}

fn driver(shell: FakeShell, dir: &Path, one_shot: bool, script: &str) -> DisplayDriver<FakeShell> {
    DisplayDriver::new(
        shell,
        PipelineCommand::new("sh", ["-c", script, "pipeline"]),
        settings(dir, one_shot),
        TimingController::new(60, 0),
    )
}

#[tokio::test]
async fn one_shot_streams_the_image_and_touches_liveness() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let shell = FakeShell::new();

    let code = with_timeout(
        driver(shell.clone(), dir.path(), true, "echo composing >&2; printf IMAGE-BYTES").run(),
    )
    .await
    .unwrap();

    assert_eq!(code, 0);
    let log = shell.snapshot();
    assert_eq!(log.connects, 1);
    assert_eq!(log.viewers, 1);
    assert_eq!(log.received, vec![b"IMAGE-BYTES".to_vec()]);
    // The viewer is cleared after the one-shot linger.
    assert_eq!(log.resets, 1);
    assert!(dir.path().join("state").join("healthz").exists());
}

#[tokio::test]
async fn exit_codes_are_reconciled() {
    let cases = [
        ("exit 0", Some(0), Verdict::Success, true),
        ("exit 0", Some(1), Verdict::DisplayFault, false),
        ("exit 220", Some(0), Verdict::Degraded, true),
        ("exit 222", Some(0), Verdict::NoImage, false),
    ];

    for (script, viewer_code, verdict, liveness) in cases {
        let dir = tempfile::tempdir().unwrap();
        let shell = FakeShell::new().with_viewer_code(viewer_code);
        let mut driver = driver(shell, dir.path(), false, script);

        let result = with_timeout(driver.run_cycle()).await.unwrap();

        assert_eq!(result.verdict, verdict, "{script} / {viewer_code:?}");
        assert_eq!(result.liveness_updated, liveness, "{script} / {viewer_code:?}");
        assert_eq!(dir.path().join("state").join("healthz").exists(), liveness);
    }
}

#[tokio::test]
async fn unexpected_pipeline_code_stops_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = RecordingNotifier::default();

    let code = with_timeout(
        driver(FakeShell::new(), dir.path(), false, "exit 3")
            .with_notifier(Arc::new(notifier.clone()))
            .run(),
    )
    .await
    .unwrap();

    assert_eq!(code, 3);
    assert_eq!(notifier.messages().len(), 1);
    assert!(!dir.path().join("state").join("healthz").exists());
}

#[tokio::test]
async fn flaky_connection_is_retried_within_a_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let shell = FakeShell::new().failing_connects(2);
    let mut driver = driver(shell.clone(), dir.path(), false, "true");

    let result = with_timeout(driver.run_cycle()).await.unwrap();

    assert_eq!(result.verdict, Verdict::Success);
    assert_eq!(shell.snapshot().connects, 3);
}

#[tokio::test]
async fn previous_viewer_is_reset_before_the_next_transfer() {
    let dir = tempfile::tempdir().unwrap();
    let shell = FakeShell::new();
    let mut driver = driver(shell.clone(), dir.path(), false, "printf x");

    with_timeout(driver.run_cycle()).await.unwrap();
    assert_eq!(shell.snapshot().resets, 0);

    with_timeout(driver.run_cycle()).await.unwrap();
    let log = shell.snapshot();
    assert_eq!(log.resets, 1);
    assert_eq!(log.viewers, 2);
    assert_eq!(log.received.len(), 2);
}

#[tokio::test]
async fn repeated_transport_failures_notify_and_exit() {
    let dir = tempfile::tempdir().unwrap();
    let shell = FakeShell::unreachable();
    let notifier = RecordingNotifier::default();

    let result = with_timeout(
        driver(shell.clone(), dir.path(), false, "true")
            .with_notifier(Arc::new(notifier.clone()))
            .run(),
    )
    .await;

    assert!(result.is_err());
    // Two cycles, each exhausting its connect attempts.
    assert_eq!(shell.snapshot().connects, NOTIFY_THRESHOLD * 3);
    assert_eq!(shell.snapshot().viewers, 0);

    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("host unreachable"), "{}", messages[0]);
}

#[tokio::test]
async fn one_shot_gives_up_after_the_first_failed_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let shell = FakeShell::unreachable();

    let result = with_timeout(driver(shell.clone(), dir.path(), true, "true").run()).await;

    assert!(result.is_err());
    assert_eq!(shell.snapshot().connects, 3);
}
