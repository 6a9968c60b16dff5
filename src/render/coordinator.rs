// src/render/coordinator.rs

//! Parallel rendering of the full panel set.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info};

use crate::render::panel::{PanelSpec, RenderOutcome};
use crate::render::placeholder::panel_error_image;
use crate::render::retry::{RetryPolicy, render_patiently};
use crate::types::RenderFlags;

/// Outcomes of one coordinator run, in configuration order.
#[derive(Debug, Clone)]
pub struct RenderReport {
    pub outcomes: Vec<RenderOutcome>,
    pub total_elapsed: Duration,
}

impl RenderReport {
    pub fn degraded(&self) -> impl Iterator<Item = &RenderOutcome> {
        self.outcomes.iter().filter(|o| o.is_degraded())
    }

    pub fn has_errors(&self) -> bool {
        self.degraded().next().is_some()
    }
}

/// Runs every panel concurrently through the retry wrapper.
///
/// One task per panel, so the pool is exactly as wide as the panel set. The
/// whole run lasts as long as the slowest panel; there is no per-panel
/// timeout.
#[derive(Debug, Clone, Copy)]
pub struct RenderCoordinator {
    policy: RetryPolicy,
}

impl RenderCoordinator {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Render all panels and return exactly one outcome per panel.
    pub async fn render_all(&self, panels: &[PanelSpec], flags: RenderFlags) -> RenderReport {
        let start = Instant::now();
        let policy = self.policy;

        let handles: Vec<_> = panels
            .iter()
            .cloned()
            .map(|spec| {
                tokio::spawn(async move { render_patiently(&spec, flags, policy).await })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(panels.len());
        for (spec, handle) in panels.iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                // The retry wrapper never panics; this only happens when the
                // runtime is shutting down underneath us.
                Err(join_err) => {
                    let message = format!("render task aborted: {join_err}");
                    error!(panel = %spec.name, error = %message, "panel task lost");
                    RenderOutcome {
                        panel_name: spec.name.clone(),
                        image: panel_error_image(spec.width, spec.height, &message),
                        elapsed: start.elapsed(),
                        error: Some(message),
                    }
                }
            };

            info!(
                panel = %outcome.panel_name,
                elapsed_secs = outcome.elapsed_seconds(),
                degraded = outcome.is_degraded(),
                "panel finished"
            );
            outcomes.push(outcome);
        }

        let total_elapsed = start.elapsed();
        info!(
            panels = outcomes.len(),
            total_elapsed_secs = total_elapsed.as_secs_f64(),
            "all panels finished"
        );

        RenderReport {
            outcomes,
            total_elapsed,
        }
    }
}
