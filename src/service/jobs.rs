// src/service/jobs.rs

//! The on-demand generation service behind the HTTP API.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use futures::stream;
use tokio::sync::Semaphore;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ServerSection;
use crate::errors::{PanelError, Result};
use crate::exec::{PipelineCommand, StreamLimits, multiplex};
use crate::service::session::{ImageWriter, JobSession, JobStatus, LogRecord, SessionStore};
use crate::types::{RenderFlags, RenderMode};

#[derive(Debug, Clone)]
pub struct JobSettings {
    pub normal_config: PathBuf,
    pub small_config: PathBuf,
    pub dummy: bool,
    pub workers: usize,
    pub session_ttl: Duration,
    pub limits: StreamLimits,
    /// Pause between queue checks while a log poller is waiting.
    pub log_poll_interval: Duration,
}

impl JobSettings {
    /// Settings from `[server]`; config paths default to `config_path`.
    pub fn from_section(section: &ServerSection, config_path: &Path) -> Self {
        let normal = section
            .normal_config
            .clone()
            .unwrap_or_else(|| config_path.to_path_buf());
        let small = section.small_config.clone().unwrap_or_else(|| normal.clone());

        Self {
            normal_config: normal,
            small_config: small,
            dummy: section.dummy_mode,
            workers: section.workers.max(1),
            session_ttl: Duration::from_secs(section.session_ttl_secs),
            limits: StreamLimits::default()
                .with_wait(Duration::from_secs(section.generation_timeout_secs)),
            log_poll_interval: Duration::from_millis(100),
        }
    }

    fn config_for(&self, mode: RenderMode) -> &Path {
        match mode {
            RenderMode::Normal => &self.normal_config,
            RenderMode::Small => &self.small_config,
        }
    }
}

/// What `fetch_image` hands back: whatever is buffered, plus the explicit
/// status so callers can tell "not started" from "empty so far".
#[derive(Debug, Clone)]
pub struct ImageSnapshot {
    pub bytes: Vec<u8>,
    pub status: JobStatus,
}

/// Owns the session store and the worker pool. Construct once per process
/// and share through an `Arc`.
#[derive(Debug)]
pub struct JobService {
    store: SessionStore,
    pool: Arc<Semaphore>,
    command: PipelineCommand,
    settings: JobSettings,
}

impl JobService {
    pub fn new(command: PipelineCommand, settings: JobSettings) -> Self {
        Self {
            store: SessionStore::new(),
            pool: Arc::new(Semaphore::new(settings.workers.max(1))),
            command,
            settings,
        }
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Start a generation and return its token right away.
    ///
    /// Sessions older than the TTL are swept first. The generation itself
    /// waits for a worker slot, so excess submissions queue.
    pub fn submit(&self, mode: RenderMode, test: bool) -> Result<String> {
        let swept = self.store.sweep(Instant::now(), self.settings.session_ttl);
        if !swept.is_empty() {
            debug!(count = swept.len(), "swept stale sessions");
        }

        let token = Uuid::new_v4().to_string();
        let session = Arc::new(JobSession::new(&token, Instant::now()));
        self.store.insert(Arc::clone(&session));

        let flags = RenderFlags {
            small: mode == RenderMode::Small,
            test,
            dummy: self.settings.dummy,
        };
        let config = self.settings.config_for(mode).to_path_buf();

        info!(token = %token, %mode, test, config = ?config, "generation submitted");

        let pool = Arc::clone(&self.pool);
        let command = self.command.clone();
        let limits = self.settings.limits;
        tokio::spawn(async move {
            let Ok(_permit) = pool.acquire_owned().await else {
                error!(token = %session.token(), "worker pool closed");
                session.finish(None);
                return;
            };
            generate(session, command, config, flags, limits).await;
        });

        Ok(token)
    }

    /// Log lines of a session, in order, until the generation has finished.
    ///
    /// Each line is delivered once. A second poller waits for the first to
    /// let go and then continues where it stopped; once the end was seen,
    /// later polls yield nothing.
    pub async fn poll_log(&self, token: &str) -> Result<impl Stream<Item = String> + Send + 'static> {
        let session = self.lookup(token)?;
        let rx = session.log_receiver().lock_owned().await;
        let interval = self.settings.log_poll_interval;

        Ok(stream::unfold(Some((rx, session)), move |state| async move {
            let (mut rx, session) = state?;
            if session.log_exhausted() {
                return None;
            }
            loop {
                match rx.try_recv() {
                    Ok(LogRecord::Line(line)) => return Some((line, Some((rx, session)))),
                    Ok(LogRecord::End) | Err(TryRecvError::Disconnected) => {
                        session.mark_log_exhausted();
                        return None;
                    }
                    Err(TryRecvError::Empty) => sleep(interval).await,
                }
            }
        }))
    }

    pub fn fetch_image(&self, token: &str) -> Result<ImageSnapshot> {
        let session = self.lookup(token)?;
        Ok(ImageSnapshot {
            bytes: session.image_snapshot(),
            status: session.status(),
        })
    }

    fn lookup(&self, token: &str) -> Result<Arc<JobSession>> {
        self.store
            .get(token)
            .ok_or_else(|| PanelError::SessionNotFound(token.to_string()))
    }
}

async fn generate(
    session: Arc<JobSession>,
    command: PipelineCommand,
    config: PathBuf,
    flags: RenderFlags,
    limits: StreamLimits,
) {
    session.set_status(JobStatus::Running);
    let token = session.token().to_string();

    let child = match command.build(&config, flags).spawn() {
        Ok(child) => child,
        Err(e) => {
            error!(token = %token, program = ?command.program(), error = %e, "failed to start pipeline");
            session.push_log(format!("failed to start pipeline: {e}"));
            session.finish(None);
            return;
        }
    };

    let writer = ImageWriter::new(Arc::clone(&session));
    let log_session = Arc::clone(&session);
    let result = multiplex(child, writer, move |line| log_session.push_log(line), &limits).await;

    match result {
        Ok(exit) => {
            if exit.timed_out {
                warn!(token = %token, "generation timed out");
            }
            info!(
                token = %token,
                exit_code = exit.exit_code(),
                bytes = exit.bytes,
                "generation finished"
            );
            session.finish(Some(exit));
        }
        Err(e) => {
            error!(token = %token, error = %e, "generation failed");
            session.push_log(format!("generation failed: {e}"));
            session.finish(None);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use futures::StreamExt;

    use super::*;

    fn settings(dir: &Path) -> JobSettings {
        JobSettings {
            normal_config: dir.join("normal.toml"),
            small_config: dir.join("small.toml"),
            dummy: false,
            workers: 1,
            session_ttl: Duration::from_secs(60),
            limits: StreamLimits::default(),
            log_poll_interval: Duration::from_millis(10),
        }
    }

    fn script(body: &str) -> PipelineCommand {
        PipelineCommand::new("sh", ["-c", body, "pipeline"])
    }

    #[tokio::test]
    async fn log_stream_is_consumed_once() {
        let dir = tempfile::tempdir().unwrap();
        let service = JobService::new(script("echo one >&2; echo two >&2"), settings(dir.path()));

        let token = service.submit(RenderMode::Normal, false).unwrap();
        let lines: Vec<String> = service.poll_log(&token).await.unwrap().collect().await;
        assert_eq!(lines, vec!["one", "two"]);

        let again: Vec<String> = service.poll_log(&token).await.unwrap().collect().await;
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let service = JobService::new(script("true"), settings(dir.path()));

        assert!(matches!(
            service.fetch_image("nope"),
            Err(PanelError::SessionNotFound(_))
        ));
        assert!(service.poll_log("nope").await.is_err());
    }

    #[tokio::test]
    async fn flags_reach_the_child() {
        let dir = tempfile::tempdir().unwrap();
        // "$@" is: --config <path> render [flags...]
        let service = JobService::new(script("echo \"$@\" >&2"), settings(dir.path()));

        let token = service.submit(RenderMode::Small, true).unwrap();
        let lines: Vec<String> = service.poll_log(&token).await.unwrap().collect().await;

        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("small.toml render --small --test"), "{}", lines[0]);
    }
}
