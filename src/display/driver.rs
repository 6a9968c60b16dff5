// src/display/driver.rs

//! The scheduled refresh loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Timelike};
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

use crate::config::ConfigFile;
use crate::display::reconcile::{DisplayCycleResult, Verdict, reconcile};
use crate::display::remote::RemoteShell;
use crate::errors::{PanelError, Result};
use crate::exec::{PipelineCommand, StreamLimits, multiplex};
use crate::liveness;
use crate::metrics::{DisplayMetrics, MetricsSink, TracingMetrics, record_display_quietly};
use crate::notify::{LogNotifier, Notifier, notify_quietly};
use crate::timing::{SleepPlan, TimingController};
use crate::types::RenderFlags;

/// Consecutive failed cycles after which the loop gives up.
pub const NOTIFY_THRESHOLD: u32 = 2;

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub config_path: PathBuf,
    pub flags: RenderFlags,
    /// Refresh once, linger briefly, exit.
    pub one_shot: bool,
    pub liveness_file: PathBuf,
    pub connect_attempts: u32,
    pub connect_retry: Duration,
    pub limits: StreamLimits,
    /// Pause after a failed cycle before the next try.
    pub failure_wait: Duration,
    /// How long the image stays up in one-shot mode before the viewer is
    /// cleared.
    pub one_shot_wait: Duration,
    pub notify_threshold: u32,
}

impl DisplaySettings {
    pub fn from_config(cfg: &ConfigFile, config_path: &Path, flags: RenderFlags, one_shot: bool) -> Self {
        let (connect_attempts, connect_retry_secs) = cfg
            .remote
            .as_ref()
            .map_or((3, 2), |r| (r.connect_attempts, r.connect_retry_secs));

        Self {
            config_path: config_path.to_path_buf(),
            flags,
            one_shot,
            liveness_file: cfg.liveness.file.clone(),
            connect_attempts: connect_attempts.max(1),
            connect_retry: Duration::from_secs(connect_retry_secs),
            limits: StreamLimits::default(),
            failure_wait: Duration::from_secs(10),
            one_shot_wait: Duration::from_secs(5),
            notify_threshold: NOTIFY_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Connect,
    Reset,
}

pub struct DisplayDriver<S> {
    shell: S,
    command: PipelineCommand,
    settings: DisplaySettings,
    timing: TimingController,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<dyn MetricsSink>,
    viewer_started: bool,
}

impl<S: RemoteShell> DisplayDriver<S> {
    pub fn new(shell: S, command: PipelineCommand, settings: DisplaySettings, timing: TimingController) -> Self {
        Self {
            shell,
            command,
            settings,
            timing,
            notifier: Arc::new(LogNotifier),
            metrics: Arc::new(TracingMetrics),
            viewer_started: false,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn timing(&self) -> &TimingController {
        &self.timing
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }

    /// One refresh: connect, clear the previous viewer, stream a freshly
    /// rendered image to the device, then reconcile both exit codes.
    ///
    /// Transport failures surface as `Err`; anything the pipeline or viewer
    /// reported is in the returned result.
    pub async fn run_cycle(&mut self) -> Result<DisplayCycleResult> {
        self.retrying(Step::Connect).await?;
        if self.viewer_started {
            self.retrying(Step::Reset).await?;
            self.viewer_started = false;
        }

        let session = self.shell.start_viewer().await?;
        self.viewer_started = true;

        let child = self
            .command
            .build(&self.settings.config_path, self.settings.flags)
            .spawn()
            .map_err(|e| {
                PanelError::Other(anyhow::anyhow!(
                    "failed to start pipeline {:?}: {e}",
                    self.command.program()
                ))
            })?;

        let exit = multiplex(
            child,
            session.input,
            |line| info!(source = "pipeline", "{}", line),
            &self.settings.limits,
        )
        .await
        .map_err(PanelError::Other)?;

        if exit.timed_out {
            warn!("pipeline overran its time budget");
        }

        let outcome = session.completion.await?;
        let mut result = reconcile(exit.exit_code(), outcome.viewer_code);

        match result.verdict {
            Verdict::Success => info!(host = %self.shell.host(), bytes = exit.bytes, "image displayed"),
            Verdict::DisplayFault => warn!(
                host = %self.shell.host(),
                viewer_code = ?outcome.viewer_code,
                "image generated but the viewer failed"
            ),
            Verdict::Degraded => warn!("image displayed with placeholder panels"),
            Verdict::NoImage => error!("pipeline produced no usable image"),
            Verdict::Fatal(code) => error!(exit_code = code, "pipeline exited with an unexpected code"),
        }

        if result.deserves_liveness() {
            match liveness::touch(&self.settings.liveness_file) {
                Ok(()) => result.liveness_updated = true,
                Err(e) => warn!(file = ?self.settings.liveness_file, error = %e, "failed to refresh liveness marker"),
            }
        }

        Ok(result)
    }

    /// Refresh until something fatal happens.
    ///
    /// Returns the process exit code: the pipeline's code after a one-shot
    /// refresh or an unexpected pipeline exit. Repeated transport failures
    /// come back as `Err` after the notifier was told.
    pub async fn run(mut self) -> Result<i32> {
        let mut failures = 0u32;

        loop {
            let started = Instant::now();
            let cycle = self.run_cycle().await;
            let elapsed = started.elapsed();

            let result = match cycle {
                Ok(result) => result,
                Err(e) => {
                    failures += 1;
                    error!(error = %e, failures, "display cycle failed");
                    self.record(elapsed, false, Some(e.to_string()), None);

                    if self.settings.one_shot || failures >= self.settings.notify_threshold {
                        let message = format!("display cycle failed {failures} time(s) in a row:\n{e}");
                        notify_quietly(self.notifier.as_ref(), &message).await;
                        return Err(e);
                    }
                    sleep(self.settings.failure_wait).await;
                    continue;
                }
            };
            failures = 0;

            let problem = describe(&result);
            let success = result.verdict == Verdict::Success;

            if let Verdict::Fatal(code) = result.verdict {
                self.record(elapsed, false, problem.clone(), None);
                let message = problem.unwrap_or_else(|| format!("pipeline exited with {code}"));
                notify_quietly(self.notifier.as_ref(), &message).await;
                return Ok(code);
            }

            if self.settings.one_shot {
                self.record(elapsed, success, problem, None);
                sleep(self.settings.one_shot_wait).await;
                if let Err(e) = self.shell.reset_viewer().await {
                    debug!(error = %e, "could not clear the viewer after a one-shot refresh");
                }
                return Ok(result.exit_status.code());
            }

            let plan = self.timing.plan(elapsed, Local::now().second());
            self.record(elapsed, success, problem, Some(&plan));
            sleep(plan.sleep).await;
        }
    }

    async fn retrying(&mut self, step: Step) -> Result<()> {
        let attempts = self.settings.connect_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = match step {
                Step::Connect => self.shell.connect().await,
                Step::Reset => self.shell.reset_viewer().await,
            };
            match result {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts => {
                    warn!(?step, attempt, attempts, error = %e, "remote step failed; retrying");
                    sleep(self.settings.connect_retry).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn record(&self, elapsed: Duration, success: bool, error: Option<String>, plan: Option<&SleepPlan>) {
        let metrics = DisplayMetrics {
            timestamp: Local::now(),
            elapsed: elapsed.as_secs_f64(),
            small: self.settings.flags.small,
            test: self.settings.flags.test,
            one_time: self.settings.one_shot,
            host: self.shell.host().to_string(),
            success,
            error,
            sleep_secs: plan.map(|p| p.sleep_secs),
            diff_sec: plan.map(|p| p.diff_sec),
        };
        record_display_quietly(self.metrics.as_ref(), &metrics);
    }
}

fn describe(result: &DisplayCycleResult) -> Option<String> {
    match result.verdict {
        Verdict::Success => None,
        Verdict::DisplayFault => Some(match result.remote_code {
            Some(code) => format!("viewer exited with {code}"),
            None => "viewer did not report an exit code".to_string(),
        }),
        Verdict::Degraded => Some("some panels failed to render".to_string()),
        Verdict::NoImage => Some("pipeline produced no image".to_string()),
        Verdict::Fatal(code) => Some(format!("pipeline exited with unexpected code {code}")),
    }
}
