// src/display/remote.rs

//! Remote shell abstraction and its OpenSSH implementation.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::RemoteSection;
use crate::display::reconcile::parse_remote_code;
use crate::errors::{PanelError, Result};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What the remote side reported after the image was shown.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteOutcome {
    /// Exit code echoed by the remote command; `None` if nothing parsable came
    /// back in time.
    pub viewer_code: Option<i32>,
}

/// A started remote viewer command.
pub struct ViewerSession {
    /// Image bytes go here; shutting it down ends the transfer.
    pub input: Box<dyn AsyncWrite + Send + Unpin>,
    /// Resolves once the remote side reported the viewer's exit code.
    pub completion: BoxFuture<'static, Result<RemoteOutcome>>,
}

/// The operations the display driver needs from the remote host.
pub trait RemoteShell: Send {
    /// Cheap round trip proving the host is reachable and we can log in.
    fn connect(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Kill the viewer left from the previous cycle and drop its connection.
    fn reset_viewer(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Start the one-shot receive-and-show command.
    fn start_viewer(&mut self) -> BoxFuture<'_, Result<ViewerSession>>;

    fn host(&self) -> &str;
}

/// Exit status OpenSSH uses for its own failures (as opposed to the remote
/// command's).
const SSH_FAILURE: i32 = 255;

/// How long to wait for the remote exit code after the image was sent.
const VIEWER_REPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// The system `ssh` client driven through `tokio::process`.
#[derive(Debug)]
pub struct OpenSshShell {
    remote: RemoteSection,
    viewer: Option<Child>,
}

impl OpenSshShell {
    pub fn new(remote: RemoteSection) -> Self {
        Self {
            remote,
            viewer: None,
        }
    }

    fn ssh(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.remote.connect_timeout_secs))
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new");
        if let Some(ref key) = self.remote.key {
            cmd.arg("-i").arg(key);
        }
        cmd.arg(format!("{}@{}", self.remote.user, self.remote.host));
        cmd
    }

    /// Run a short remote command and return its exit code.
    async fn run_short(&self, remote_cmd: &str) -> Result<i32> {
        let mut cmd = self.ssh();
        cmd.arg(remote_cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let budget = Duration::from_secs(self.remote.connect_timeout_secs + 10);
        let output = timeout(budget, cmd.output())
            .await
            .map_err(|_| PanelError::RemoteError(format!("'{remote_cmd}' timed out")))??;

        let code = output.status.code().unwrap_or(-1);
        if code == SSH_FAILURE {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PanelError::RemoteError(format!(
                "ssh to {} failed: {}",
                self.remote.host,
                stderr.trim()
            )));
        }
        Ok(code)
    }
}

/// The remote side of a transfer: store stdin, show it once, report.
pub fn viewer_command(remote: &RemoteSection) -> String {
    let tmp = shell_quote(&remote.tmp_path);
    format!(
        "cat - > {tmp} && sudo {viewer} -1 -T 1 -d {fb} --noverbose {tmp}; echo $?",
        viewer = shell_quote(&remote.viewer),
        fb = shell_quote(&remote.framebuffer),
    )
}

fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-".contains(c))
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

impl RemoteShell for OpenSshShell {
    fn connect(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            info!(host = %self.remote.host, "connecting");
            match self.run_short("true").await? {
                0 => Ok(()),
                code => Err(PanelError::RemoteError(format!(
                    "connection probe exited with {code}"
                ))),
            }
        })
    }

    fn reset_viewer(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if let Some(mut child) = self.viewer.take() {
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "previous ssh session already gone");
                }
            }
            // killall exits 1 when nothing matched, which is fine.
            let code = self
                .run_short(&format!("sudo killall -9 {}", shell_quote(&self.remote.viewer)))
                .await?;
            debug!(code, "viewer reset");
            Ok(())
        })
    }

    fn start_viewer(&mut self) -> BoxFuture<'_, Result<ViewerSession>> {
        Box::pin(async move {
            let mut cmd = self.ssh();
            cmd.arg(viewer_command(&self.remote))
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            let mut child = cmd.spawn()?;
            let input = child
                .stdin
                .take()
                .ok_or_else(|| PanelError::RemoteError("ssh stdin is not piped".into()))?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| PanelError::RemoteError("ssh stdout is not piped".into()))?;
            let stderr = child.stderr.take();

            if let Some(stderr) = stderr {
                tokio::spawn(async move {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        debug!("remote stderr: {}", line);
                    }
                });
            }

            // The ssh child stays with us so the next reset can kill it even
            // if the viewer never returns.
            self.viewer = Some(child);

            let completion: BoxFuture<'static, Result<RemoteOutcome>> = Box::pin(async move {
                let mut lines = BufReader::new(stdout).lines();
                let mut seen = String::new();
                let read = timeout(VIEWER_REPORT_TIMEOUT, async {
                    while let Ok(Some(line)) = lines.next_line().await {
                        seen.push_str(&line);
                        seen.push('\n');
                        if parse_remote_code(&line).is_some() {
                            break;
                        }
                    }
                })
                .await;
                if read.is_err() {
                    warn!("viewer did not report an exit code in time");
                }
                Ok::<_, PanelError>(RemoteOutcome {
                    viewer_code: parse_remote_code(&seen),
                })
            });

            Ok(ViewerSession {
                input: Box::new(input),
                completion,
            })
        })
    }

    fn host(&self) -> &str {
        &self.remote.host
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote() -> RemoteSection {
        toml::from_str(r#"host = "panel.local""#).unwrap()
    }

    #[test]
    fn viewer_command_matches_device_protocol() {
        assert_eq!(
            viewer_command(&remote()),
            "cat - > /dev/shm/display.png && sudo fbi -1 -T 1 -d /dev/fb0 --noverbose /dev/shm/display.png; echo $?"
        );
    }

    #[test]
    fn odd_paths_are_quoted() {
        assert_eq!(shell_quote("/tmp/a b"), "'/tmp/a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn ssh_arguments_carry_key_and_target() {
        let mut section = remote();
        section.key = Some("/etc/inkpanel/id_ed25519".into());
        let shell = OpenSshShell::new(section);
        let cmd = shell.ssh();
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.windows(2).any(|w| w == ["-i", "/etc/inkpanel/id_ed25519"]));
        assert_eq!(args.last().map(String::as_str), Some("ubuntu@panel.local"));
    }
}
