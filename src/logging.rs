// src/logging.rs

//! Logging setup for `inkpanel` using `tracing` + `tracing-subscriber`.
//!
//! Filter priority:
//! 1. `--log-level` CLI flag, applied to every target
//! 2. `INKPANEL_LOG` as `EnvFilter` directives (`debug`, `inkpanel=debug,hyper=warn`)
//! 3. `info`
//!
//! Everything goes to STDERR. Under `render` stdout carries PNG bytes and the
//! stderr lines are what the job service and the display driver forward, so
//! that style drops colours and targets.

use std::io::IsTerminal;

use anyhow::{Result, anyhow};
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::{Command, LogLevel};

pub const LOG_ENV: &str = "INKPANEL_LOG";

/// Chatty dependencies kept at `warn` unless a directive says otherwise.
const QUIET_DEPS: &[&str] = &["hyper=warn", "reqwest=warn", "h2=warn"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStyle {
    /// Long-running commands logging to a console or journal.
    Service,
    /// Lines read back by a parent process; plain and compact.
    Forwarded,
}

impl LogStyle {
    pub fn for_command(command: &Command) -> Self {
        match command {
            Command::Render { .. } => LogStyle::Forwarded,
            _ => LogStyle::Service,
        }
    }
}

/// Initialise the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>, style: LogStyle) -> Result<()> {
    let env = std::env::var(LOG_ENV).ok();
    let (filter, rejected) = build_filter(cli_level, env.as_deref());

    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_ids(false)
        .with_thread_names(false);

    let installed = match style {
        LogStyle::Service => builder
            .with_target(true)
            .with_ansi(std::io::stderr().is_terminal())
            .try_init(),
        LogStyle::Forwarded => builder.compact().with_target(false).with_ansi(false).try_init(),
    };
    installed.map_err(|e| anyhow!("installing log subscriber: {e}"))?;

    if let Some(bad) = rejected {
        warn!(env = LOG_ENV, value = %bad, "ignoring unparsable log filter");
    }
    Ok(())
}

/// The filter to install plus the env value that had to be ignored, if any.
fn build_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> (EnvFilter, Option<String>) {
    let quiet = |base: &str| {
        QUIET_DEPS
            .iter()
            .fold(base.to_string(), |acc, d| format!("{acc},{d}"))
    };

    if let Some(lvl) = cli_level {
        return (EnvFilter::new(quiet(level_name(lvl))), None);
    }

    match env.map(str::trim).filter(|s| !s.is_empty()) {
        Some(directives) => match EnvFilter::try_new(quiet(directives)) {
            Ok(filter) => (filter, None),
            Err(_) => (EnvFilter::new(quiet("info")), Some(directives.to_string())),
        },
        None => (EnvFilter::new(quiet("info")), None),
    }
}

fn level_name(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use tracing::level_filters::LevelFilter;

    use super::*;
    use crate::cli::CliArgs;

    #[test]
    fn cli_level_wins_over_env() {
        let (filter, rejected) = build_filter(Some(LogLevel::Debug), Some("error"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
        assert!(rejected.is_none());
    }

    #[test]
    fn env_directives_are_honoured() {
        let (filter, rejected) = build_filter(None, Some("inkpanel=trace"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
        assert!(rejected.is_none());
    }

    #[test]
    fn garbage_env_falls_back_to_info() {
        let (filter, rejected) = build_filter(None, Some("inkpanel=loudest"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(rejected.as_deref(), Some("inkpanel=loudest"));

        let (filter, rejected) = build_filter(None, Some("  "));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO));
        assert!(rejected.is_none());
    }

    #[test]
    fn render_logs_are_forwarded_style() {
        let args = CliArgs::try_parse_from(["inkpanel", "render"]).unwrap();
        assert_eq!(LogStyle::for_command(&args.command), LogStyle::Forwarded);
        let args = CliArgs::try_parse_from(["inkpanel", "serve"]).unwrap();
        assert_eq!(LogStyle::for_command(&args.command), LogStyle::Service);
    }
}
