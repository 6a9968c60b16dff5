// src/exec/multiplexer.rs

//! Concurrent draining of a child's binary stdout and textual stderr.
//!
//! Pipe buffers are bounded, so a child blocked writing one stream while we
//! wait on the other deadlocks both sides. The binary stream is copied by its
//! own task; the calling task polls for exit and forwards stderr lines between
//! polls. Only after the child has exited *and* both streams are drained does
//! [`multiplex`] return.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, error, info, warn};

const CHUNK_SIZE: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLimits {
    /// How long the child may run before it is asked to stop.
    pub wait: Duration,
    /// Grace period between SIGTERM and SIGKILL.
    pub terminate_grace: Duration,
    /// Upper bound for draining leftovers once the child is gone. A grandchild
    /// holding the pipes open must not hang us forever.
    pub drain_timeout: Duration,
    /// Pause between liveness checks while stderr is quiet.
    pub poll_interval: Duration,
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self {
            wait: Duration::from_secs(120),
            terminate_grace: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl StreamLimits {
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildExit {
    /// `None` when the child was killed by a signal.
    pub code: Option<i32>,
    /// The child overran [`StreamLimits::wait`] and was terminated.
    pub timed_out: bool,
    /// Bytes copied from stdout into the sink.
    pub bytes: u64,
}

impl ChildExit {
    pub fn exit_code(&self) -> i32 {
        self.code.unwrap_or(-1)
    }
}

/// Drive `child` to completion.
///
/// stdout is copied into `sink` chunk by chunk as it arrives (the sink is
/// shut down at EOF); every stderr line is handed to `on_line` in order.
pub async fn multiplex<W, F>(
    mut child: Child,
    sink: W,
    mut on_line: F,
    limits: &StreamLimits,
) -> Result<ChildExit>
where
    W: AsyncWrite + Unpin + Send + 'static,
    F: FnMut(String),
{
    let pid = child.id();
    let stdout = child.stdout.take().context("child stdout is not piped")?;
    let stderr = child.stderr.take().context("child stderr is not piped")?;

    let mut copier = tokio::spawn(copy_binary(stdout, sink));

    let mut lines = BufReader::new(stderr).lines();
    let mut stderr_open = true;
    let deadline = Instant::now() + limits.wait;
    let mut timed_out = false;

    let status = loop {
        if let Some(status) = child.try_wait().context("polling child status")? {
            break status;
        }

        if Instant::now() >= deadline {
            warn!(pid, wait = ?limits.wait, "child overran its time budget; terminating");
            timed_out = true;
            break terminate(&mut child, limits.terminate_grace).await?;
        }

        if stderr_open {
            // `next_line` is cancel safe, so a timeout loses no data.
            match timeout(limits.poll_interval, lines.next_line()).await {
                Ok(Ok(Some(line))) => on_line(line),
                Ok(Ok(None)) => stderr_open = false,
                Ok(Err(e)) => {
                    warn!(pid, error = %e, "reading child stderr failed");
                    stderr_open = false;
                }
                Err(_) => {}
            }
        } else {
            sleep(limits.poll_interval).await;
        }
    };

    info!(pid, exit_code = ?status.code(), timed_out, "child exited");

    if stderr_open {
        let drained = timeout(limits.drain_timeout, async {
            while let Ok(Some(line)) = lines.next_line().await {
                on_line(line);
            }
        })
        .await;
        if drained.is_err() {
            warn!(pid, "stderr still open after child exit; giving up on it");
        }
    }

    let bytes = match timeout(limits.drain_timeout, &mut copier).await {
        Ok(Ok(Ok(bytes))) => bytes,
        Ok(Ok(Err(e))) => {
            error!(pid, error = %e, "copying child stdout failed");
            0
        }
        Ok(Err(join_err)) => {
            error!(pid, error = %join_err, "stdout copier task failed");
            0
        }
        Err(_) => {
            warn!(pid, "stdout still open after child exit; giving up on it");
            // Nothing may reach the sink once we report the child as done.
            copier.abort();
            let _ = copier.await;
            0
        }
    };

    debug!(pid, bytes, "child output drained");

    Ok(ChildExit {
        code: status.code(),
        timed_out,
        bytes,
    })
}

async fn copy_binary<R, W>(mut reader: R, mut sink: W) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        sink.write_all(&buf[..n]).await?;
        total += n as u64;
    }
    sink.shutdown().await?;
    Ok(total)
}

/// SIGTERM, wait up to `grace`, then SIGKILL.
async fn terminate(child: &mut Child, grace: Duration) -> Result<std::process::ExitStatus> {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: plain syscall on a pid we own and have not reaped yet.
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc == 0 {
            if let Ok(status) = timeout(grace, child.wait()).await {
                return status.context("waiting for terminated child");
            }
            warn!(pid, "child ignored SIGTERM; killing");
        }
    }

    #[cfg(not(unix))]
    let _ = grace;

    child.kill().await.context("killing child")?;
    child.wait().await.context("waiting for killed child")
}

#[cfg(all(test, unix))]
mod tests {
    use std::process::Stdio;

    use tokio::process::Command;

    use super::*;

    fn sh(script: &str) -> Child {
        Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn large_output_on_both_streams_does_not_deadlock() {
        // Far beyond a 64 KiB pipe buffer on each stream.
        let child = sh(
            "i=0; while [ $i -lt 3000 ]; do echo \"log line $i\" >&2; i=$((i+1)); done & \
             head -c 500000 /dev/zero; wait",
        );
        let (tx, mut rx) = tokio::io::duplex(1 << 20);
        let reader = tokio::spawn(async move {
            let mut out = Vec::new();
            rx.read_to_end(&mut out).await.unwrap();
            out
        });

        let mut lines = Vec::new();
        let exit = multiplex(child, tx, |l| lines.push(l), &StreamLimits::default())
            .await
            .unwrap();

        assert_eq!(exit.code, Some(0));
        assert!(!exit.timed_out);
        assert_eq!(exit.bytes, 500_000);
        assert_eq!(reader.await.unwrap().len(), 500_000);
        assert_eq!(lines.len(), 3000);
        assert_eq!(lines[0], "log line 0");
        assert_eq!(lines[2999], "log line 2999");
    }

    #[tokio::test]
    async fn exit_code_is_reported() {
        let child = sh("echo oops >&2; exit 220");
        let mut lines = Vec::new();
        let exit = multiplex(child, tokio::io::sink(), |l| lines.push(l), &StreamLimits::default())
            .await
            .unwrap();
        assert_eq!(exit.exit_code(), 220);
        assert_eq!(lines, vec!["oops".to_string()]);
    }

    #[tokio::test]
    async fn overrunning_child_is_terminated() {
        let child = sh("echo started >&2; exec sleep 30");
        let limits = StreamLimits {
            wait: Duration::from_millis(300),
            terminate_grace: Duration::from_secs(2),
            drain_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(20),
        };
        let start = std::time::Instant::now();
        let exit = multiplex(child, tokio::io::sink(), |_| {}, &limits).await.unwrap();

        assert!(exit.timed_out);
        assert_eq!(exit.code, None);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn lingering_grandchild_cannot_write_after_return() {
        let child = sh("(sleep 2; printf late) & exit 0");
        let limits = StreamLimits {
            drain_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(20),
            ..StreamLimits::default()
        };
        let (tx, mut rx) = tokio::io::duplex(1024);
        let reader = tokio::spawn(async move {
            let mut out = Vec::new();
            rx.read_to_end(&mut out).await.unwrap();
            out
        });

        let exit = multiplex(child, tx, |_| {}, &limits).await.unwrap();
        assert_eq!(exit.code, Some(0));
        assert_eq!(exit.bytes, 0);

        // The sink is released on return, well before the grandchild prints.
        let out = timeout(Duration::from_millis(1000), reader)
            .await
            .expect("sink still held by a detached copier")
            .unwrap();
        assert!(out.is_empty(), "{:?}", String::from_utf8_lossy(&out));
    }
}
