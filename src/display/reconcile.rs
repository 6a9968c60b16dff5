// src/display/reconcile.rs

//! Interpreting the pair (local pipeline exit code, remote viewer exit code).

use crate::types::{EXIT_CODE_MAJOR, EXIT_CODE_MINOR};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayExitStatus {
    Ok,
    Major,
    Minor,
    Unknown(i32),
}

impl DisplayExitStatus {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => DisplayExitStatus::Ok,
            EXIT_CODE_MAJOR => DisplayExitStatus::Major,
            EXIT_CODE_MINOR => DisplayExitStatus::Minor,
            other => DisplayExitStatus::Unknown(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            DisplayExitStatus::Ok => 0,
            DisplayExitStatus::Major => EXIT_CODE_MAJOR,
            DisplayExitStatus::Minor => EXIT_CODE_MINOR,
            DisplayExitStatus::Unknown(code) => code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Image generated and shown.
    Success,
    /// Image generated, the viewer failed or never reported. The panel keeps
    /// its previous picture.
    DisplayFault,
    /// Placeholders in the image, but an image nonetheless.
    Degraded,
    /// The pipeline produced only its full-canvas error image.
    NoImage,
    /// The pipeline broke its exit-code contract; stop the loop.
    Fatal(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayCycleResult {
    pub exit_status: DisplayExitStatus,
    pub remote_code: Option<i32>,
    pub verdict: Verdict,
    /// Whether this cycle refreshed the liveness marker.
    pub liveness_updated: bool,
}

impl DisplayCycleResult {
    /// Whether the cycle earns a liveness refresh.
    pub fn deserves_liveness(&self) -> bool {
        matches!(self.verdict, Verdict::Success | Verdict::Degraded)
    }
}

/// Decide what a cycle amounted to. `liveness_updated` starts out `false`;
/// the driver sets it once the marker was actually touched.
///
/// Only an image that reached the screen refreshes liveness; a viewer failure
/// leaves the previous picture up and must show as a stall.
pub fn reconcile(local_code: i32, remote_code: Option<i32>) -> DisplayCycleResult {
    let exit_status = DisplayExitStatus::from_code(local_code);

    let verdict = match exit_status {
        DisplayExitStatus::Ok if remote_code == Some(0) => Verdict::Success,
        DisplayExitStatus::Ok => Verdict::DisplayFault,
        DisplayExitStatus::Minor => Verdict::Degraded,
        DisplayExitStatus::Major => Verdict::NoImage,
        DisplayExitStatus::Unknown(code) => Verdict::Fatal(code),
    };

    DisplayCycleResult {
        exit_status,
        remote_code,
        verdict,
        liveness_updated: false,
    }
}

/// Pull the exit code echoed by the remote command out of its stdout.
pub fn parse_remote_code(stdout: &str) -> Option<i32> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .and_then(|l| l.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconciliation_table() {
        let cases = [
            (0, Some(0), Verdict::Success, true),
            (0, Some(1), Verdict::DisplayFault, false),
            (0, None, Verdict::DisplayFault, false),
            (EXIT_CODE_MINOR, Some(0), Verdict::Degraded, true),
            (EXIT_CODE_MINOR, Some(1), Verdict::Degraded, true),
            (EXIT_CODE_MAJOR, Some(0), Verdict::NoImage, false),
            (1, Some(0), Verdict::Fatal(1), false),
            (-1, None, Verdict::Fatal(-1), false),
        ];

        for (local, remote, verdict, liveness) in cases {
            let result = reconcile(local, remote);
            assert_eq!(result.verdict, verdict, "local={local} remote={remote:?}");
            assert_eq!(result.deserves_liveness(), liveness, "local={local} remote={remote:?}");
            assert!(!result.liveness_updated);
        }
    }

    #[test]
    fn remote_code_is_the_last_non_empty_line() {
        assert_eq!(parse_remote_code("0\n"), Some(0));
        assert_eq!(parse_remote_code("noise\n 1 \n\n"), Some(1));
        assert_eq!(parse_remote_code(""), None);
        assert_eq!(parse_remote_code("garbage"), None);
    }
}
