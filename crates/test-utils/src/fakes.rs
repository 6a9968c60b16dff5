#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::bail;
use image::{Rgba, RgbaImage};
use inkpanel::display::{BoxFuture, RemoteOutcome, RemoteShell, ViewerSession};
use inkpanel::errors::{PanelError, Result};
use inkpanel::notify::{Notifier, NotifyFuture};
use inkpanel::render::{PanelRenderer, RenderContext};
use tokio::io::AsyncReadExt;

/// Fills the panel with one colour.
#[derive(Debug, Clone, Copy)]
pub struct Solid(pub [u8; 4]);

impl PanelRenderer for Solid {
    fn render(&self, ctx: &RenderContext) -> anyhow::Result<RgbaImage> {
        Ok(RgbaImage::from_pixel(ctx.width, ctx.height, Rgba(self.0)))
    }
}

/// Fails on every attempt, counting them.
#[derive(Debug, Default)]
pub struct AlwaysFails {
    pub message: String,
    pub calls: Arc<AtomicU32>,
}

impl AlwaysFails {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }
}

impl PanelRenderer for AlwaysFails {
    fn render(&self, _ctx: &RenderContext) -> anyhow::Result<RgbaImage> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        bail!("{} (attempt {n})", self.message)
    }
}

/// Fails the first `failures` attempts, then behaves like [`Solid`].
#[derive(Debug)]
pub struct FailsTimes {
    pub failures: u32,
    pub color: [u8; 4],
    pub calls: Arc<AtomicU32>,
}

impl FailsTimes {
    pub fn new(failures: u32, color: [u8; 4]) -> Self {
        Self {
            failures,
            color,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }
}

impl PanelRenderer for FailsTimes {
    fn render(&self, ctx: &RenderContext) -> anyhow::Result<RgbaImage> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.failures {
            bail!("transient failure {n}");
        }
        Ok(RgbaImage::from_pixel(ctx.width, ctx.height, Rgba(self.color)))
    }
}

/// What a [`FakeShell`] was asked to do.
#[derive(Debug, Default, Clone)]
pub struct ShellLog {
    pub connects: u32,
    pub resets: u32,
    pub viewers: u32,
    /// Bytes received by each started viewer, in order.
    pub received: Vec<Vec<u8>>,
}

/// In-memory remote shell.
///
/// Connection attempts fail while `connect_failures` is non-zero (or always,
/// with `unreachable`). Every viewer swallows its input and reports
/// `viewer_code`.
#[derive(Debug, Clone)]
pub struct FakeShell {
    pub host: String,
    pub connect_failures: u32,
    pub unreachable: bool,
    pub viewer_code: Option<i32>,
    pub log: Arc<Mutex<ShellLog>>,
}

impl FakeShell {
    pub fn new() -> Self {
        Self {
            host: "fake-panel".to_string(),
            connect_failures: 0,
            unreachable: false,
            viewer_code: Some(0),
            log: Arc::new(Mutex::new(ShellLog::default())),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::new()
        }
    }

    pub fn failing_connects(mut self, n: u32) -> Self {
        self.connect_failures = n;
        self
    }

    pub fn with_viewer_code(mut self, code: Option<i32>) -> Self {
        self.viewer_code = code;
        self
    }

    pub fn snapshot(&self) -> ShellLog {
        self.log.lock().unwrap().clone()
    }
}

impl Default for FakeShell {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteShell for FakeShell {
    fn connect(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.log.lock().unwrap().connects += 1;
            if self.unreachable {
                return Err(PanelError::RemoteError("host unreachable".into()));
            }
            if self.connect_failures > 0 {
                self.connect_failures -= 1;
                return Err(PanelError::RemoteError("connection refused".into()));
            }
            Ok(())
        })
    }

    fn reset_viewer(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.log.lock().unwrap().resets += 1;
            Ok(())
        })
    }

    fn start_viewer(&mut self) -> BoxFuture<'_, Result<ViewerSession>> {
        Box::pin(async move {
            self.log.lock().unwrap().viewers += 1;

            let (writer, mut reader) = tokio::io::duplex(64 * 1024);
            let log = Arc::clone(&self.log);
            let viewer_code = self.viewer_code;

            // Read concurrently, like the remote `cat` would.
            let reading = tokio::spawn(async move {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).await.map(|_| buf)
            });

            let completion: BoxFuture<'static, Result<RemoteOutcome>> = Box::pin(async move {
                let buf = reading
                    .await
                    .map_err(|e| PanelError::Other(e.into()))??;
                log.lock().unwrap().received.push(buf);
                Ok::<_, PanelError>(RemoteOutcome { viewer_code })
            });

            Ok(ViewerSession {
                input: Box::new(writer),
                completion,
            })
        })
    }

    fn host(&self) -> &str {
        &self.host
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    pub messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify_error<'a>(&'a self, message: &'a str) -> NotifyFuture<'a> {
        Box::pin(async move {
            self.messages.lock().unwrap().push(message.to_string());
            Ok(())
        })
    }
}
