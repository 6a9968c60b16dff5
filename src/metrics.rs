// src/metrics.rs

//! Per-cycle measurements handed to a metrics sink.
//!
//! Recording is best effort: a sink that fails logs a warning and the cycle
//! carries on.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::MetricsSection;
use crate::errors::Result;
use crate::render::RenderReport;
use crate::types::{PipelineStatus, RenderFlags};

#[derive(Debug, Clone, Serialize)]
pub struct PanelMetrics {
    pub name: String,
    pub elapsed: f64,
    pub has_error: bool,
    pub error: Option<String>,
}

/// One run of the render pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct RenderMetrics {
    pub timestamp: DateTime<Local>,
    pub total_elapsed: f64,
    pub panels: Vec<PanelMetrics>,
    pub small: bool,
    pub test: bool,
    pub dummy: bool,
    pub error_code: i32,
}

impl RenderMetrics {
    pub fn from_report(report: &RenderReport, flags: RenderFlags, status: PipelineStatus) -> Self {
        Self {
            timestamp: Local::now(),
            total_elapsed: report.total_elapsed.as_secs_f64(),
            panels: report
                .outcomes
                .iter()
                .map(|o| PanelMetrics {
                    name: o.panel_name.clone(),
                    elapsed: o.elapsed_seconds(),
                    has_error: o.is_degraded(),
                    error: o.error.clone(),
                })
                .collect(),
            small: flags.small,
            test: flags.test,
            dummy: flags.dummy,
            error_code: status.exit_code(),
        }
    }
}

/// One cycle of the display driver.
#[derive(Debug, Clone, Serialize)]
pub struct DisplayMetrics {
    pub timestamp: DateTime<Local>,
    pub elapsed: f64,
    pub small: bool,
    pub test: bool,
    pub one_time: bool,
    pub host: String,
    pub success: bool,
    pub error: Option<String>,
    pub sleep_secs: Option<f64>,
    pub diff_sec: Option<i64>,
}

pub trait MetricsSink: Send + Sync {
    fn record_render(&self, metrics: &RenderMetrics) -> Result<()>;
    fn record_display(&self, metrics: &DisplayMetrics) -> Result<()>;
}

/// Emits every record as a structured log event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetrics;

impl MetricsSink for TracingMetrics {
    fn record_render(&self, m: &RenderMetrics) -> Result<()> {
        info!(
            total_elapsed = m.total_elapsed,
            panels = m.panels.len(),
            degraded = m.panels.iter().filter(|p| p.has_error).count(),
            small = m.small,
            test = m.test,
            dummy = m.dummy,
            error_code = m.error_code,
            "render metrics"
        );
        Ok(())
    }

    fn record_display(&self, m: &DisplayMetrics) -> Result<()> {
        info!(
            elapsed = m.elapsed,
            host = %m.host,
            success = m.success,
            one_time = m.one_time,
            sleep_secs = ?m.sleep_secs,
            diff_sec = ?m.diff_sec,
            "display metrics"
        );
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Record<'a> {
    Render(&'a RenderMetrics),
    Display(&'a DisplayMetrics),
}

/// Appends one JSON object per line to a file, and logs like [`TracingMetrics`].
#[derive(Debug)]
pub struct JsonlMetrics {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlMetrics {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn append(&self, record: &Record<'_>) -> Result<()> {
        let mut line = serde_json::to_vec(record).map_err(anyhow::Error::from)?;
        line.push(b'\n');

        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(&line)?;
        Ok(())
    }
}

impl MetricsSink for JsonlMetrics {
    fn record_render(&self, metrics: &RenderMetrics) -> Result<()> {
        TracingMetrics.record_render(metrics)?;
        self.append(&Record::Render(metrics))
    }

    fn record_display(&self, metrics: &DisplayMetrics) -> Result<()> {
        TracingMetrics.record_display(metrics)?;
        self.append(&Record::Display(metrics))
    }
}

pub fn from_config(section: &MetricsSection) -> Arc<dyn MetricsSink> {
    match section.file {
        Some(ref path) => Arc::new(JsonlMetrics::new(path)),
        None => Arc::new(TracingMetrics),
    }
}

pub fn record_render_quietly(sink: &dyn MetricsSink, metrics: &RenderMetrics) {
    if let Err(e) = sink.record_render(metrics) {
        warn!(error = %e, "failed to record render metrics");
    }
}

pub fn record_display_quietly(sink: &dyn MetricsSink, metrics: &DisplayMetrics) {
    if let Err(e) = sink.record_display(metrics) {
        warn!(error = %e, "failed to record display metrics");
    }
}
