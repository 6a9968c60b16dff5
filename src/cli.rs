// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::types::RenderFlags;

/// Command-line arguments for `inkpanel`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "inkpanel",
    version,
    about = "Render a multi-panel dashboard image and push it to a frame-buffer display.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `inkpanel.toml` in the current working directory.
    #[arg(long, global = true, value_name = "PATH", default_value = "inkpanel.toml")]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `INKPANEL_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Render the composite image once.
    ///
    /// PNG bytes go to stdout (or `--output`), logs to stderr. Exits 0, 220
    /// when some panels fell back to placeholders, 222 when no image could
    /// be assembled.
    Render {
        #[command(flatten)]
        flags: FlagArgs,

        /// Write the PNG here instead of stdout.
        #[arg(long, short, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Parse and validate, print the panel set, render nothing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Periodically render and show the image on the remote display.
    Display {
        #[command(flatten)]
        flags: FlagArgs,

        /// Refresh once and exit.
        #[arg(long)]
        one_shot: bool,

        /// Override `[remote].host`.
        #[arg(long, env = "INKPANEL_HOST", value_name = "HOST")]
        host: Option<String>,

        /// Override `[remote].key`.
        #[arg(long, env = "INKPANEL_SSH_KEY", value_name = "PATH")]
        key: Option<PathBuf>,
    },

    /// Serve on-demand generation over HTTP.
    Serve,

    /// Exit 0 when the liveness marker is fresh, 1 otherwise.
    Healthz,
}

#[derive(Debug, Clone, Copy, Default, clap::Args)]
pub struct FlagArgs {
    /// Use the reduced layout.
    #[arg(long)]
    pub small: bool,

    /// Skip rendering and emit a blank canvas.
    #[arg(long)]
    pub test: bool,

    /// Ask renderers for canned data instead of live sources.
    #[arg(long)]
    pub dummy: bool,
}

impl From<FlagArgs> for RenderFlags {
    fn from(args: FlagArgs) -> Self {
        RenderFlags {
            small: args.small,
            test: args.test,
            dummy: args.dummy,
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_flags_follow_the_subcommand() {
        let args = CliArgs::try_parse_from([
            "inkpanel", "render", "--small", "--test", "--config", "small.toml",
        ])
        .unwrap();

        assert_eq!(args.config, PathBuf::from("small.toml"));
        match args.command {
            Command::Render { flags, output, dry_run } => {
                let flags = RenderFlags::from(flags);
                assert!(flags.small && flags.test && !flags.dummy);
                assert!(output.is_none());
                assert!(!dry_run);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn display_accepts_overrides() {
        let args = CliArgs::try_parse_from([
            "inkpanel", "display", "--one-shot", "--host", "panel.lan",
        ])
        .unwrap();

        match args.command {
            Command::Display { one_shot, host, .. } => {
                assert!(one_shot);
                assert_eq!(host.as_deref(), Some("panel.lan"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn pipeline_arguments_parse_back() {
        let flags = RenderFlags { small: true, test: false, dummy: true };
        let mut argv = vec!["inkpanel".to_string(), "--config".into(), "a.toml".into(), "render".into()];
        argv.extend(flags.to_args());

        let args = CliArgs::try_parse_from(argv).unwrap();
        let Command::Render { flags: parsed, .. } = args.command else {
            panic!("expected render");
        };
        let parsed = RenderFlags::from(parsed);
        assert_eq!((parsed.small, parsed.test, parsed.dummy), (true, false, true));
    }
}
