// src/render/builtin.rs

//! Renderers that ship with the binary.
//!
//! Real content generation lives outside this crate; these exist so a config
//! file can describe a usable canvas without plugins. `command` is the escape
//! hatch for everything else.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate, NaiveDateTime};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::RgbColor;
use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, RgbaImage};
use tracing::{debug, info, warn};

use crate::config::{ConfigFile, PanelConfig, RendererKind};
use crate::errors::PanelError;
use crate::render::geometry::{Geometry, GeometryCache};
use crate::render::panel::{PanelRenderer, PanelSpec, Placement, RenderContext};
use crate::render::text::{char_width, draw_text, line_height};

/// Solid white rectangle of the panel size.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlankRenderer;

impl PanelRenderer for BlankRenderer {
    fn render(&self, ctx: &RenderContext) -> Result<RgbaImage> {
        Ok(RgbaImage::from_pixel(
            ctx.width,
            ctx.height,
            Rgba([255, 255, 255, 255]),
        ))
    }
}

/// Current local time in large monospace digits, date underneath.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockRenderer;

impl ClockRenderer {
    fn now(dummy: bool) -> NaiveDateTime {
        if dummy {
            // Stable picture for layout work.
            NaiveDate::from_ymd_opt(2000, 1, 1)
                .and_then(|d| d.and_hms_opt(12, 34, 0))
                .unwrap_or_default()
        } else {
            Local::now().naive_local()
        }
    }
}

impl PanelRenderer for ClockRenderer {
    fn render(&self, ctx: &RenderContext) -> Result<RgbaImage> {
        let mut img = RgbaImage::from_pixel(ctx.width, ctx.height, Rgba([255, 255, 255, 255]));
        let now = Self::now(ctx.flags.dummy);

        let time = now.format("%H:%M").to_string();
        let date = now.format("%a %Y-%m-%d").to_string();

        // Time takes two thirds of the height, date the rest.
        let time_scale = fit_scale(&time, ctx.width, ctx.height * 2 / 3);
        let date_scale = fit_scale(&date, ctx.width, ctx.height / 3).min(time_scale);

        let time_w = (char_width() * time_scale) as i64 * time.len() as i64;
        let time_x = (ctx.width as i64 - time_w) / 2;
        let below = draw_text(&mut img, &time, (time_x, 0), time_scale, Rgb888::BLACK);

        let date_w = (char_width() * date_scale) as i64 * date.len() as i64;
        let date_x = (ctx.width as i64 - date_w) / 2;
        draw_text(&mut img, &date, (date_x, below), date_scale, Rgb888::BLACK);

        Ok(img)
    }
}

fn fit_scale(text: &str, width: u32, height: u32) -> u32 {
    let columns = text.chars().count().max(1) as u32;
    let by_width = width / (char_width() * columns);
    let by_height = height / line_height();
    by_width.min(by_height).max(1)
}

/// Static image file, stretched to the panel size when it differs.
#[derive(Debug, Clone)]
pub struct ImageFileRenderer {
    path: PathBuf,
}

impl ImageFileRenderer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PanelRenderer for ImageFileRenderer {
    fn render(&self, ctx: &RenderContext) -> Result<RgbaImage> {
        let img = image::open(&self.path)
            .with_context(|| format!("opening image {:?}", self.path))?
            .to_rgba8();

        if img.dimensions() == (ctx.width, ctx.height) {
            Ok(img)
        } else {
            Ok(imageops::resize(&img, ctx.width, ctx.height, FilterType::Lanczos3))
        }
    }
}

/// External program that writes a PNG to stdout.
///
/// Invoked as `<program> --width W --height H [--small] [--test] [--dummy] <args...>`.
/// When the program's output size differs from the request, the request is
/// adjusted by the difference and remembered in the geometry cache, so the
/// next run asks for a size that comes out right. Output is always resized to
/// the panel size.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    cache: Arc<GeometryCache>,
}

impl CommandRenderer {
    pub fn new(program: impl Into<String>, cache: Arc<GeometryCache>) -> Self {
        Self {
            program: program.into(),
            cache,
        }
    }

    fn run(&self, ctx: &RenderContext, request: Geometry) -> Result<RgbaImage> {
        debug!(
            panel = %ctx.panel,
            program = %self.program,
            width = request.width,
            height = request.height,
            "running renderer command"
        );

        let output = Command::new(&self.program)
            .arg("--width")
            .arg(request.width.to_string())
            .arg("--height")
            .arg(request.height.to_string())
            .args(ctx.flags.to_args())
            .args(&ctx.args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("spawning renderer '{}'", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "renderer '{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            );
        }

        let img = image::load_from_memory_with_format(&output.stdout, ImageFormat::Png)
            .with_context(|| format!("decoding PNG from renderer '{}'", self.program))?;
        Ok(img.to_rgba8())
    }
}

impl PanelRenderer for CommandRenderer {
    fn render(&self, ctx: &RenderContext) -> Result<RgbaImage> {
        let wanted = Geometry::new(ctx.width, ctx.height);
        let request = self.cache.lookup(wanted).unwrap_or(wanted);

        let img = self.run(ctx, request)?;
        let (got_w, got_h) = img.dimensions();

        if (got_w, got_h) == (wanted.width, wanted.height) {
            return Ok(img);
        }

        let adjusted = Geometry::new(
            adjust(request.width, wanted.width, got_w),
            adjust(request.height, wanted.height, got_h),
        );
        info!(
            panel = %ctx.panel,
            got_width = got_w,
            got_height = got_h,
            next_width = adjusted.width,
            next_height = adjusted.height,
            "renderer output size mismatch; learning adjusted geometry"
        );
        if let Err(e) = self.cache.store(wanted, adjusted) {
            warn!(panel = %ctx.panel, error = %format!("{e:#}"), "could not persist adjusted geometry");
        }

        Ok(imageops::resize(&img, wanted.width, wanted.height, FilterType::Lanczos3))
    }
}

/// Shift `requested` by however far `got` missed `wanted`.
fn adjust(requested: u32, wanted: u32, got: u32) -> u32 {
    let next = requested as i64 + wanted as i64 - got as i64;
    next.max(1) as u32
}

/// Build the panel set described by the config, in declaration order.
pub fn build_panels(cfg: &ConfigFile, cache: Arc<GeometryCache>) -> crate::errors::Result<Vec<PanelSpec>> {
    cfg.panel
        .iter()
        .map(|panel| build_panel(panel, &cache))
        .collect()
}

fn build_panel(panel: &PanelConfig, cache: &Arc<GeometryCache>) -> crate::errors::Result<PanelSpec> {
    let renderer: Arc<dyn PanelRenderer> = match panel.kind {
        RendererKind::Blank => Arc::new(BlankRenderer),
        RendererKind::Clock => Arc::new(ClockRenderer),
        RendererKind::Image => {
            let path = panel.path.clone().ok_or_else(|| {
                PanelError::ConfigError(format!("panel '{}' needs a `path`", panel.name))
            })?;
            Arc::new(ImageFileRenderer::new(path))
        }
        RendererKind::Command => {
            let program = panel.command.clone().ok_or_else(|| {
                PanelError::ConfigError(format!("panel '{}' needs a `command`", panel.name))
            })?;
            Arc::new(CommandRenderer::new(program, Arc::clone(cache)))
        }
    };

    Ok(PanelSpec {
        name: panel.name.clone(),
        renderer,
        args: panel.args.clone(),
        width: panel.width,
        height: panel.height,
        placement: Placement {
            x: panel.x,
            y: panel.y,
            scale: panel.scale,
        },
    })
}
