// src/exec/pipeline_command.rs

//! How to launch the render pipeline as a child process.
//!
//! The child speaks a private protocol: PNG bytes on stdout, log lines on
//! stderr, and a [`PipelineStatus`](crate::types::PipelineStatus) exit code.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::Context;
use tokio::process::Command;

use crate::config::PipelineSection;
use crate::errors::Result;
use crate::types::RenderFlags;

#[derive(Debug, Clone)]
pub struct PipelineCommand {
    program: PathBuf,
    prefix_args: Vec<OsString>,
}

impl PipelineCommand {
    /// `program prefix_args... --config <path> render <flags>`.
    pub fn new<I, S>(program: impl Into<PathBuf>, prefix_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            prefix_args: prefix_args.into_iter().map(Into::into).collect(),
        }
    }

    /// The running binary's own `render` subcommand.
    pub fn current_exe() -> Result<Self> {
        let exe = std::env::current_exe().context("locating current executable")?;
        Ok(Self::new(exe, Vec::<OsString>::new()))
    }

    pub fn from_config(section: &PipelineSection) -> Result<Self> {
        match section.program {
            Some(ref program) => Ok(Self::new(program, Vec::<OsString>::new())),
            None => Self::current_exe(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Ready-to-spawn command with stdout and stderr piped. The child is killed
    /// if its handle is dropped.
    pub fn build(&self, config: &Path, flags: RenderFlags) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix_args)
            .arg("--config")
            .arg(config)
            .arg("render")
            .args(flags.to_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}
