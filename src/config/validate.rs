// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{ConfigFile, RawConfigFile, RendererKind};
use crate::errors::{PanelError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::PanelError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_device(cfg)?;
    validate_update(cfg)?;
    validate_retry(cfg)?;
    validate_server(cfg)?;
    validate_panels(cfg)?;
    validate_z_order(cfg)?;
    Ok(())
}

/// Largest accepted panel `scale`.
pub const MAX_PANEL_SCALE: f32 = 16.0;

fn config_error(msg: impl Into<String>) -> PanelError {
    PanelError::ConfigError(msg.into())
}

fn validate_device(cfg: &RawConfigFile) -> Result<()> {
    if cfg.device.width == 0 || cfg.device.height == 0 {
        return Err(config_error(format!(
            "[device] size must be positive (got {}x{})",
            cfg.device.width, cfg.device.height
        )));
    }
    Ok(())
}

fn validate_update(cfg: &RawConfigFile) -> Result<()> {
    if cfg.update.interval == 0 {
        return Err(config_error("[update].interval must be >= 1 (got 0)"));
    }
    if cfg.update.target_second >= 60 {
        return Err(config_error(format!(
            "[update].target_second must be within 0..60 (got {})",
            cfg.update.target_second
        )));
    }
    Ok(())
}

fn validate_retry(cfg: &RawConfigFile) -> Result<()> {
    if cfg.retry.attempts == 0 {
        return Err(config_error("[retry].attempts must be >= 1 (got 0)"));
    }
    if !(cfg.retry.delay_secs >= 0.0) {
        return Err(config_error(format!(
            "[retry].delay_secs must be non-negative (got {})",
            cfg.retry.delay_secs
        )));
    }
    Ok(())
}

fn validate_server(cfg: &RawConfigFile) -> Result<()> {
    if cfg.server.workers == 0 {
        return Err(config_error("[server].workers must be >= 1 (got 0)"));
    }
    Ok(())
}

fn validate_panels(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();

    for panel in cfg.panel.iter() {
        if panel.name.trim().is_empty() {
            return Err(config_error("[[panel]] entries must have a non-empty name"));
        }
        if !seen.insert(panel.name.as_str()) {
            return Err(config_error(format!(
                "duplicate panel name '{}'",
                panel.name
            )));
        }
        if panel.width == 0 || panel.height == 0 {
            return Err(config_error(format!(
                "panel '{}' must have a positive size (got {}x{})",
                panel.name, panel.width, panel.height
            )));
        }
        if let Some(scale) = panel.scale {
            if !(scale > 0.0) {
                return Err(config_error(format!(
                    "panel '{}' has non-positive scale {}",
                    panel.name, scale
                )));
            }
            if !(scale <= MAX_PANEL_SCALE) {
                return Err(config_error(format!(
                    "panel '{}' scale {} exceeds {}",
                    panel.name, scale, MAX_PANEL_SCALE
                )));
            }
        }
        match panel.kind {
            RendererKind::Image if panel.path.is_none() => {
                return Err(config_error(format!(
                    "panel '{}' of kind \"image\" requires `path`",
                    panel.name
                )));
            }
            RendererKind::Command if panel.command.is_none() => {
                return Err(config_error(format!(
                    "panel '{}' of kind \"command\" requires `command`",
                    panel.name
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

fn validate_z_order(cfg: &RawConfigFile) -> Result<()> {
    let Some(ref order) = cfg.compose.z_order else {
        return Ok(());
    };

    let names: HashSet<&str> = cfg.panel.iter().map(|p| p.name.as_str()).collect();
    let mut seen = HashSet::new();

    for name in order.iter() {
        if !names.contains(name.as_str()) {
            return Err(config_error(format!(
                "[compose].z_order references unknown panel '{}'",
                name
            )));
        }
        if !seen.insert(name.as_str()) {
            return Err(config_error(format!(
                "[compose].z_order lists panel '{}' twice",
                name
            )));
        }
    }
    Ok(())
}
