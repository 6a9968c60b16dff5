// src/pipeline.rs

//! One full render: panels, composition, status.
//!
//! The pipeline never fails outright. Whatever goes wrong, the caller gets a
//! canvas to show and a [`PipelineStatus`] describing how much of it is real.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::compose::{CompositeImage, Wall, assemble};
use crate::config::{ConfigFile, DeviceSection, WallConfig};
use crate::errors::Result;
use crate::metrics::{self, MetricsSink, RenderMetrics, TracingMetrics};
use crate::notify::{self, LogNotifier, Notifier};
use crate::render::placeholder::canvas_error_image;
use crate::render::{
    GeometryCache, PanelSpec, RenderCoordinator, RenderReport, RetryPolicy, build_panels,
};
use crate::types::{PipelineStatus, RenderFlags};

pub struct Pipeline {
    device: DeviceSection,
    panels: Vec<PanelSpec>,
    walls: Vec<WallConfig>,
    z_order: Vec<String>,
    coordinator: RenderCoordinator,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<dyn MetricsSink>,
}

impl Pipeline {
    /// Pipeline over an explicit panel set; drawn in the given order, no
    /// walls, log-only notifier and metrics.
    pub fn new(device: DeviceSection, panels: Vec<PanelSpec>, policy: RetryPolicy) -> Self {
        let z_order = panels.iter().map(|p| p.name.clone()).collect();
        Self {
            device,
            panels,
            walls: Vec::new(),
            z_order,
            coordinator: RenderCoordinator::new(policy),
            notifier: Arc::new(LogNotifier),
            metrics: Arc::new(TracingMetrics),
        }
    }

    /// Everything from the config file: built-in renderers, walls, z-order,
    /// retry policy and the configured notifier / metrics sinks.
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        let cache = Arc::new(GeometryCache::new(
            &cfg.cache.geometry_file,
            Duration::from_secs(cfg.cache.expire_hours * 3600),
        ));
        let panels = build_panels(cfg, cache)?;

        Ok(Self::new(cfg.device, panels, RetryPolicy::from(&cfg.retry))
            .with_walls(cfg.wall.clone())
            .with_z_order(cfg.z_order().into_iter().map(str::to_string).collect())
            .with_notifier(notify::from_config(&cfg.notify)?)
            .with_metrics(metrics::from_config(&cfg.metrics)))
    }

    pub fn with_walls(mut self, walls: Vec<WallConfig>) -> Self {
        self.walls = walls;
        self
    }

    pub fn with_z_order(mut self, z_order: Vec<String>) -> Self {
        self.z_order = z_order;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn panels(&self) -> &[PanelSpec] {
        &self.panels
    }

    /// Render every panel and compose the canvas.
    ///
    /// - `test`: blank canvas, `Ok`, nothing rendered.
    /// - Some panels degraded: canvas with their placeholders, `Minor`.
    /// - Composition failed: full-canvas error image, `Major`.
    pub async fn create_image(&self, flags: RenderFlags) -> (CompositeImage, PipelineStatus) {
        info!(
            small = flags.small,
            test = flags.test,
            dummy = flags.dummy,
            panels = self.panels.len(),
            "creating image"
        );

        if flags.test {
            return (CompositeImage::blank(&self.device), PipelineStatus::Ok);
        }

        let report = self.coordinator.render_all(&self.panels, flags).await;

        let mut status = PipelineStatus::Ok;
        for outcome in report.degraded() {
            status = status.worst(PipelineStatus::Minor);
            let message = format!(
                "panel '{}' failed:\n{}",
                outcome.panel_name,
                outcome.error.as_deref().unwrap_or_default()
            );
            notify::notify_quietly(self.notifier.as_ref(), &message).await;
        }

        let image = match self.compose(&report) {
            Ok(image) => image,
            Err(e) => {
                let message = format!("{e:#}");
                error!(error = %message, "composition failed");
                notify::notify_quietly(self.notifier.as_ref(), &message).await;
                status = PipelineStatus::Major;
                CompositeImage::new(canvas_error_image(
                    self.device.width,
                    self.device.height,
                    &message,
                ))
            }
        };

        if status != PipelineStatus::Ok {
            warn!(exit_code = status.exit_code(), "image created with errors");
        }

        metrics::record_render_quietly(
            self.metrics.as_ref(),
            &RenderMetrics::from_report(&report, flags, status),
        );

        (image, status)
    }

    fn compose(&self, report: &RenderReport) -> Result<CompositeImage> {
        let walls = self.load_walls()?;
        let z_order: Vec<&str> = self.z_order.iter().map(String::as_str).collect();
        assemble(&self.device, &walls, &self.panels, &z_order, &report.outcomes)
    }

    fn load_walls(&self) -> Result<Vec<Wall>> {
        self.walls
            .iter()
            .map(|w| {
                let image = open_wall(&w.path)?;
                Ok(Wall {
                    image,
                    x: w.x,
                    y: w.y,
                })
            })
            .collect()
    }
}

fn open_wall(path: &Path) -> Result<image::RgbaImage> {
    Ok(image::open(path)?.to_rgba8())
}
