use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Exit code of the render pipeline when some panels had to be replaced by
/// placeholders but a canvas was still produced.
pub const EXIT_CODE_MINOR: i32 = 220;

/// Exit code of the render pipeline when no usable image could be produced.
pub const EXIT_CODE_MAJOR: i32 = 222;

/// Pipeline-level outcome shared by the `render` command, the job service and
/// the display driver (it travels across the process boundary as an exit code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Ok,
    Major,
    Minor,
}

impl PipelineStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            PipelineStatus::Ok => 0,
            PipelineStatus::Major => EXIT_CODE_MAJOR,
            PipelineStatus::Minor => EXIT_CODE_MINOR,
        }
    }

    /// Map a process exit code back to a status. Codes outside the private
    /// contract return `None`.
    pub fn from_exit_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(PipelineStatus::Ok),
            EXIT_CODE_MAJOR => Some(PipelineStatus::Major),
            EXIT_CODE_MINOR => Some(PipelineStatus::Minor),
            _ => None,
        }
    }

    /// Combine two statuses, keeping the more severe one.
    pub fn worst(self, other: PipelineStatus) -> PipelineStatus {
        use PipelineStatus::*;
        match (self, other) {
            (Major, _) | (_, Major) => Major,
            (Minor, _) | (_, Minor) => Minor,
            _ => Ok,
        }
    }
}

/// Which layout variant to render.
///
/// The job service picks a different config file per mode; renderers only see
/// the `small` flag in their context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    #[default]
    Normal,
    Small,
}

impl FromStr for RenderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "normal" => Ok(RenderMode::Normal),
            "small" => Ok(RenderMode::Small),
            other => Err(format!(
                "invalid mode: {other} (expected \"normal\" or \"small\")"
            )),
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderMode::Normal => f.write_str("normal"),
            RenderMode::Small => f.write_str("small"),
        }
    }
}

/// Flags forwarded from the CLI / HTTP request down to every renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderFlags {
    pub small: bool,
    /// Skip panel rendering entirely and emit the blank canvas.
    pub test: bool,
    /// Renderers should substitute canned data for live sources.
    pub dummy: bool,
}

impl RenderFlags {
    /// Command line arguments understood by the `render` subcommand.
    pub fn to_args(self) -> Vec<String> {
        let mut args = Vec::new();
        if self.small {
            args.push("--small".to_string());
        }
        if self.test {
            args.push("--test".to_string());
        }
        if self.dummy {
            args.push("--dummy".to_string());
        }
        args
    }
}
