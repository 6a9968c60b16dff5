// src/render/retry.rs

//! Bounded retry around a single panel render.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, error, warn};

use crate::config::RetrySection;
use crate::render::panel::{PanelSpec, RenderOutcome};
use crate::render::placeholder::panel_error_image;
use crate::types::RenderFlags;

/// Fixed-delay retry policy. No backoff and no jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_secs(5),
        }
    }
}

impl From<&RetrySection> for RetryPolicy {
    fn from(section: &RetrySection) -> Self {
        Self {
            attempts: section.attempts.max(1),
            delay: Duration::from_secs_f64(section.delay_secs.max(0.0)),
        }
    }
}

/// Render `spec`, retrying on failure, and always return an outcome.
///
/// Every attempt runs on the blocking pool so CPU-heavy renderers don't stall
/// the async workers, and a panicking renderer counts as a failed attempt.
/// Attempts are separated by `policy.delay`; there is no delay after the last
/// one. Once all attempts fail the outcome carries a placeholder image and the
/// text of the last failure. `elapsed` covers every attempt and every delay.
pub async fn render_patiently(
    spec: &PanelSpec,
    flags: RenderFlags,
    policy: RetryPolicy,
) -> RenderOutcome {
    let start = Instant::now();
    let attempts = policy.attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        let renderer = Arc::clone(&spec.renderer);
        let ctx = spec.context(flags, attempt);

        let result = tokio::task::spawn_blocking(move || renderer.render(&ctx)).await;

        match result {
            Ok(Ok(image)) => {
                debug!(panel = %spec.name, attempt, "panel rendered");
                return RenderOutcome {
                    panel_name: spec.name.clone(),
                    image,
                    elapsed: start.elapsed(),
                    error: None,
                };
            }
            Ok(Err(err)) => {
                last_error = format!("{err:#}");
            }
            Err(join_err) if join_err.is_panic() => {
                last_error = format!(
                    "renderer panicked: {}",
                    panic_message(join_err.into_panic())
                );
            }
            Err(join_err) => {
                last_error = format!("render task did not complete: {join_err}");
            }
        }

        error!(panel = %spec.name, attempt, error = %last_error, "panel render failed");

        if attempt < attempts {
            warn!(panel = %spec.name, delay = ?policy.delay, "retrying panel render");
            sleep(policy.delay).await;
        }
    }

    RenderOutcome {
        panel_name: spec.name.clone(),
        image: panel_error_image(spec.width, spec.height, &last_error),
        elapsed: start.elapsed(),
        error: Some(last_error),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use anyhow::{Context, bail};
    use image::{Rgba, RgbaImage};

    use super::*;
    use crate::render::panel::{Placement, RenderContext};

    fn spec_with(renderer: Arc<dyn crate::render::PanelRenderer>) -> PanelSpec {
        PanelSpec {
            name: "weather".to_string(),
            renderer,
            args: Vec::new(),
            width: 120,
            height: 80,
            placement: Placement { x: 0, y: 0, scale: None },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_makes_exactly_the_configured_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let spec = spec_with(Arc::new(move |ctx: &RenderContext| -> anyhow::Result<RgbaImage> {
            counter.fetch_add(1, Ordering::SeqCst);
            bail!("source unreachable (attempt {})", ctx.attempt)
        }));

        let policy = RetryPolicy::default();
        let outcome = render_patiently(&spec, RenderFlags::default(), policy).await;

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        let err = outcome.error.expect("placeholder outcome");
        assert!(err.contains("source unreachable (attempt 5)"), "{err}");
        assert_eq!(outcome.image.dimensions(), (120, 80));
        assert!(outcome.elapsed >= policy.delay * 4);
    }

    #[tokio::test(start_paused = true)]
    async fn panic_counts_as_failed_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let spec = spec_with(Arc::new(move |_: &RenderContext| -> anyhow::Result<RgbaImage> {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("font cache corrupted");
            }
            Ok(RgbaImage::from_pixel(120, 80, Rgba([1, 2, 3, 255])))
        }));

        let outcome = render_patiently(&spec, RenderFlags::default(), RetryPolicy::default()).await;

        assert!(outcome.error.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.image.get_pixel(0, 0), &Rgba([1, 2, 3, 255]));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_text_is_the_flattened_error_chain() {
        let spec = spec_with(Arc::new(|_: &RenderContext| -> anyhow::Result<RgbaImage> {
            Err(anyhow::anyhow!("socket closed")).context("fetching forecast")
        }));
        let policy = RetryPolicy { attempts: 1, delay: Duration::ZERO };

        let outcome = render_patiently(&spec, RenderFlags::default(), policy).await;

        assert_eq!(outcome.error.as_deref(), Some("fetching forecast: socket closed"));
    }

    #[test]
    fn policy_from_config_section() {
        let policy = RetryPolicy::from(&RetrySection {
            attempts: 0,
            delay_secs: 0.25,
        });
        assert_eq!(policy.attempts, 1);
        assert_eq!(policy.delay, Duration::from_millis(250));
    }
}
