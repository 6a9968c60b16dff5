// src/render/panel.rs

//! Contracts between the orchestration layer and panel content generators.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;

use crate::types::RenderFlags;

/// Something that can draw one panel.
///
/// Implementations are called from a blocking worker thread and may perform
/// network I/O or heavy computation. Returning `Err` triggers a retry; a
/// panic is treated the same way.
pub trait PanelRenderer: Send + Sync {
    fn render(&self, ctx: &RenderContext) -> anyhow::Result<RgbaImage>;
}

impl<F> PanelRenderer for F
where
    F: Fn(&RenderContext) -> anyhow::Result<RgbaImage> + Send + Sync,
{
    fn render(&self, ctx: &RenderContext) -> anyhow::Result<RgbaImage> {
        self(ctx)
    }
}

/// Everything a renderer gets to know about the current attempt.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub panel: String,
    pub width: u32,
    pub height: u32,
    pub flags: RenderFlags,
    /// 1-based attempt counter.
    pub attempt: u32,
    pub args: Vec<String>,
}

/// Where a panel lands on the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: i64,
    pub y: i64,
    pub scale: Option<f32>,
}

/// One configured panel: name, renderer, arguments and placement.
#[derive(Clone)]
pub struct PanelSpec {
    pub name: String,
    pub renderer: Arc<dyn PanelRenderer>,
    pub args: Vec<String>,
    pub width: u32,
    pub height: u32,
    pub placement: Placement,
}

impl fmt::Debug for PanelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PanelSpec")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("placement", &self.placement)
            .finish_non_exhaustive()
    }
}

impl PanelSpec {
    pub fn context(&self, flags: RenderFlags, attempt: u32) -> RenderContext {
        RenderContext {
            panel: self.name.clone(),
            width: self.width,
            height: self.height,
            flags,
            attempt,
            args: self.args.clone(),
        }
    }
}

/// Result of rendering one panel, successful or not.
///
/// When `error` is set, `image` is a synthesized placeholder and never real
/// content.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub panel_name: String,
    pub image: RgbaImage,
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl RenderOutcome {
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}
