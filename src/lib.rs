// src/lib.rs

pub mod cli;
pub mod compose;
pub mod config;
pub mod display;
pub mod errors;
pub mod exec;
pub mod liveness;
pub mod logging;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod render;
pub mod service;
pub mod timing;
pub mod types;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::display::{DisplayDriver, DisplaySettings, OpenSshShell};
use crate::errors::PanelError;
use crate::exec::PipelineCommand;
use crate::pipeline::Pipeline;
use crate::timing::TimingController;
use crate::types::{PipelineStatus, RenderFlags};

/// High-level entry point used by `main.rs`.
///
/// Loads and validates the config, then dispatches to the subcommand.
/// Returns the process exit code.
pub async fn run(args: CliArgs) -> Result<i32> {
    let cfg = load_and_validate(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    match args.command {
        Command::Render { flags, output, dry_run } => {
            if dry_run {
                print_dry_run(&cfg);
                return Ok(0);
            }
            render(&cfg, flags.into(), output.as_deref()).await
        }
        Command::Display { flags, one_shot, host, key } => {
            display(&cfg, &args.config, flags.into(), one_shot, host, key).await
        }
        Command::Serve => {
            service::serve(&cfg, &args.config).await?;
            Ok(0)
        }
        Command::Healthz => Ok(healthz(&cfg)),
    }
}

/// Render once and write the PNG. The exit code carries the pipeline status.
async fn render(cfg: &ConfigFile, flags: RenderFlags, output: Option<&Path>) -> Result<i32> {
    let pipeline = Pipeline::from_config(cfg)?;
    let (image, status) = pipeline.create_image(flags).await;

    let png = match image.encode_png() {
        Ok(png) => png,
        Err(e) => {
            error!(error = %e, "failed to encode the composite image");
            return Ok(PipelineStatus::Major.exit_code());
        }
    };

    match output {
        Some(path) => {
            tokio::fs::write(path, &png)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!(path = ?path, bytes = png.len(), "image written");
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&png).await?;
            stdout.flush().await?;
            debug!(bytes = png.len(), "image written to stdout");
        }
    }

    Ok(status.exit_code())
}

async fn display(
    cfg: &ConfigFile,
    config_path: &Path,
    flags: RenderFlags,
    one_shot: bool,
    host: Option<String>,
    key: Option<PathBuf>,
) -> Result<i32> {
    let mut remote = cfg
        .remote
        .clone()
        .ok_or_else(|| PanelError::ConfigError("`display` needs a [remote] section".into()))?;
    if let Some(host) = host {
        remote.host = host;
    }
    if key.is_some() {
        remote.key = key;
    }

    let settings = DisplaySettings::from_config(cfg, config_path, flags, one_shot);
    let driver = DisplayDriver::new(
        OpenSshShell::new(remote),
        PipelineCommand::from_config(&cfg.pipeline)?,
        settings,
        TimingController::from_config(&cfg.update),
    )
    .with_notifier(notify::from_config(&cfg.notify)?)
    .with_metrics(metrics::from_config(&cfg.metrics));

    Ok(driver.run().await?)
}

fn healthz(cfg: &ConfigFile) -> i32 {
    let health = liveness::check(&cfg.liveness.file, Duration::from_secs(cfg.update.interval));
    if health.is_healthy() {
        info!(file = ?cfg.liveness.file, ?health, "healthy");
        0
    } else {
        warn!(file = ?cfg.liveness.file, ?health, "unhealthy");
        1
    }
}

/// Simple dry-run output: canvas, walls and panels in drawing order.
fn print_dry_run(cfg: &ConfigFile) {
    println!("inkpanel dry-run");
    println!("  device = {}x{}", cfg.device.width, cfg.device.height);
    println!(
        "  update.interval = {}s, target_second = {}",
        cfg.update.interval, cfg.update.target_second
    );
    println!(
        "  retry = {} attempts, {}s apart",
        cfg.retry.attempts, cfg.retry.delay_secs
    );
    println!();

    if !cfg.wall.is_empty() {
        println!("walls ({}):", cfg.wall.len());
        for wall in &cfg.wall {
            println!("  - {} at ({}, {})", wall.path.display(), wall.x, wall.y);
        }
    }

    println!("panels ({}), z-order {:?}:", cfg.panel.len(), cfg.z_order());
    for panel in &cfg.panel {
        println!("  - {}", panel.name);
        println!("      kind: {:?}", panel.kind);
        println!(
            "      at: ({}, {}) size {}x{}",
            panel.x, panel.y, panel.width, panel.height
        );
        if let Some(scale) = panel.scale {
            println!("      scale: {scale}");
        }
        if let Some(ref path) = panel.path {
            println!("      path: {}", path.display());
        }
        if let Some(ref command) = panel.command {
            println!("      command: {command}");
        }
        if !panel.args.is_empty() {
            println!("      args: {:?}", panel.args);
        }
    }

    debug!("dry-run complete (nothing rendered)");
}
