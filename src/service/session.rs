// src/service/session.rs

//! Per-request generation state and the store that owns it.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::time::Instant;
use tracing::debug;

use crate::exec::ChildExit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Waiting for a worker slot.
    Pending,
    /// The pipeline process is running.
    Running,
    /// The process exited and its output is fully drained.
    Done,
    /// Swept from the store.
    Expired,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry of a session's log queue. `End` is pushed exactly once, after the
/// process exited and both output streams were drained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    Line(String),
    End,
}

pub type LogReceiver = Arc<AsyncMutex<mpsc::UnboundedReceiver<LogRecord>>>;

pub struct JobSession {
    token: String,
    created_at: Instant,
    status: Mutex<JobStatus>,
    log_tx: mpsc::UnboundedSender<LogRecord>,
    log_rx: LogReceiver,
    log_exhausted: AtomicBool,
    image: RwLock<Vec<u8>>,
    exit: Mutex<Option<ChildExit>>,
}

impl fmt::Debug for JobSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSession")
            .field("token", &self.token)
            .field("created_at", &self.created_at)
            .field("status", &self.status())
            .field("image_len", &self.image_len())
            .finish_non_exhaustive()
    }
}

impl JobSession {
    pub fn new(token: impl Into<String>, created_at: Instant) -> Self {
        let (log_tx, log_rx) = mpsc::unbounded_channel();
        Self {
            token: token.into(),
            created_at,
            status: Mutex::new(JobStatus::Pending),
            log_tx,
            log_rx: Arc::new(AsyncMutex::new(log_rx)),
            log_exhausted: AtomicBool::new(false),
            image: RwLock::new(Vec::new()),
            exit: Mutex::new(None),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn status(&self) -> JobStatus {
        *self.status.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_status(&self, status: JobStatus) {
        *self.status.lock().unwrap_or_else(|p| p.into_inner()) = status;
    }

    pub fn exit(&self) -> Option<ChildExit> {
        *self.exit.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn push_log(&self, line: String) {
        // The receiver lives as long as the session, so this cannot fail.
        let _ = self.log_tx.send(LogRecord::Line(line));
    }

    /// Record the outcome, mark the session done and close the log.
    pub fn finish(&self, exit: Option<ChildExit>) {
        *self.exit.lock().unwrap_or_else(|p| p.into_inner()) = exit;
        self.set_status(JobStatus::Done);
        let _ = self.log_tx.send(LogRecord::End);
    }

    pub(crate) fn log_receiver(&self) -> LogReceiver {
        Arc::clone(&self.log_rx)
    }

    pub(crate) fn mark_log_exhausted(&self) {
        self.log_exhausted.store(true, Ordering::SeqCst);
    }

    pub fn log_exhausted(&self) -> bool {
        self.log_exhausted.load(Ordering::SeqCst)
    }

    pub fn append_image(&self, bytes: &[u8]) {
        self.image
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .extend_from_slice(bytes);
    }

    /// Copy of everything buffered so far.
    pub fn image_snapshot(&self) -> Vec<u8> {
        self.image.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn image_len(&self) -> usize {
        self.image.read().unwrap_or_else(|p| p.into_inner()).len()
    }
}

/// `AsyncWrite` adapter that appends into a session's image buffer.
pub struct ImageWriter {
    session: Arc<JobSession>,
}

impl ImageWriter {
    pub fn new(session: Arc<JobSession>) -> Self {
        Self { session }
    }
}

impl AsyncWrite for ImageWriter {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.session.append_image(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Token → session map owned by the job service.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Arc<JobSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Arc<JobSession>) {
        self.lock().insert(session.token().to_string(), session);
    }

    pub fn get(&self, token: &str) -> Option<Arc<JobSession>> {
        self.lock().get(token).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every session created more than `ttl` before `now`, finished or
    /// not, and return their tokens.
    pub fn sweep(&self, now: Instant, ttl: Duration) -> Vec<String> {
        let mut sessions = self.lock();
        let stale: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| now.saturating_duration_since(s.created_at()) > ttl)
            .map(|(token, _)| token.clone())
            .collect();

        for token in &stale {
            if let Some(session) = sessions.remove(token) {
                session.set_status(JobStatus::Expired);
                debug!(token = %token, "session swept");
            }
        }
        stale
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<JobSession>>> {
        self.sessions.lock().unwrap_or_else(|p| p.into_inner())
    }
}
