// src/compose.rs

//! Composite assembly and conversion to the display's colour model.

use std::collections::HashMap;
use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageFormat, Luma, Rgba, RgbaImage};
use tracing::debug;

use crate::config::DeviceSection;
use crate::errors::{PanelError, Result};
use crate::render::{PanelSpec, RenderOutcome};

const GAMMA: f64 = 2.2;

/// A static image pasted under every panel.
#[derive(Debug, Clone)]
pub struct Wall {
    pub image: RgbaImage,
    pub x: i64,
    pub y: i64,
}

/// The finished canvas. Built once by [`assemble`] and never mutated after.
#[derive(Debug, Clone)]
pub struct CompositeImage {
    image: RgbaImage,
}

impl CompositeImage {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    /// Opaque white canvas of the device size.
    pub fn blank(device: &DeviceSection) -> Self {
        Self::new(blank_canvas(device))
    }

    pub fn as_rgba(&self) -> &RgbaImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Single-channel, gamma-corrected rendition for the e-paper panel.
    ///
    /// Channels are linearised with gamma 2.2, reduced with ITU-R 601 luma,
    /// and the result re-encoded with 1/2.2. Alpha is dropped.
    pub fn to_display_gray(&self) -> GrayImage {
        let decode = gamma_table(GAMMA);
        let encode = gamma_table(1.0 / GAMMA);

        let (w, h) = self.image.dimensions();
        GrayImage::from_fn(w, h, |x, y| {
            let Rgba([r, g, b, _]) = *self.image.get_pixel(x, y);
            let (r, g, b) = (
                decode[r as usize] as u32,
                decode[g as usize] as u32,
                decode[b as usize] as u32,
            );
            let luma = (r * 299 + g * 587 + b * 114) / 1000;
            Luma([encode[luma as usize]])
        })
    }

    /// PNG bytes of [`Self::to_display_gray`].
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        self.to_display_gray().write_to(&mut buf, ImageFormat::Png)?;
        Ok(buf.into_inner())
    }
}

fn gamma_table(exponent: f64) -> [u8; 256] {
    let mut table = [0u8; 256];
    for (i, slot) in table.iter_mut().enumerate() {
        *slot = ((i as f64 / 255.0).powf(exponent) * 255.0) as u8;
    }
    table
}

fn blank_canvas(device: &DeviceSection) -> RgbaImage {
    RgbaImage::from_pixel(device.width, device.height, Rgba([255, 255, 255, 255]))
}

/// Overlay walls and panel outcomes onto a fresh canvas.
///
/// Outcomes are matched to panels by name, so the order in which they
/// finished does not matter; drawing follows `z_order` (first is bottom).
/// A name in `z_order` without a panel or an outcome is an assembly error.
pub fn assemble(
    device: &DeviceSection,
    walls: &[Wall],
    panels: &[PanelSpec],
    z_order: &[&str],
    outcomes: &[RenderOutcome],
) -> Result<CompositeImage> {
    let mut canvas = blank_canvas(device);

    for wall in walls {
        imageops::overlay(&mut canvas, &wall.image, wall.x, wall.y);
    }

    let specs: HashMap<&str, &PanelSpec> = panels.iter().map(|p| (p.name.as_str(), p)).collect();
    let by_name: HashMap<&str, &RenderOutcome> = outcomes
        .iter()
        .map(|o| (o.panel_name.as_str(), o))
        .collect();

    for name in z_order {
        let spec = specs
            .get(name)
            .ok_or_else(|| PanelError::ConfigError(format!("z-order names unknown panel '{name}'")))?;
        let outcome = by_name.get(name).ok_or_else(|| PanelError::RenderError {
            panel: name.to_string(),
            message: "no render outcome".to_string(),
        })?;

        let placed = match spec.placement.scale {
            Some(scale) if scale > 0.0 && (scale - 1.0).abs() > f32::EPSILON => {
                let (w, h) = outcome.image.dimensions();
                let sw = ((w as f32 * scale).round() as u32).max(1);
                let sh = ((h as f32 * scale).round() as u32).max(1);
                imageops::resize(&outcome.image, sw, sh, FilterType::Lanczos3)
            }
            _ => outcome.image.clone(),
        };

        debug!(
            panel = %name,
            x = spec.placement.x,
            y = spec.placement.y,
            width = placed.width(),
            height = placed.height(),
            "placing panel"
        );
        imageops::overlay(&mut canvas, &placed, spec.placement.x, spec.placement.y);
    }

    Ok(CompositeImage::new(canvas))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::render::Placement;
    use crate::render::builtin::BlankRenderer;

    fn device() -> DeviceSection {
        DeviceSection {
            width: 40,
            height: 20,
        }
    }

    fn spec(name: &str, x: i64, scale: Option<f32>) -> PanelSpec {
        PanelSpec {
            name: name.to_string(),
            renderer: Arc::new(BlankRenderer),
            args: Vec::new(),
            width: 10,
            height: 10,
            placement: Placement { x, y: 0, scale },
        }
    }

    fn outcome(name: &str, color: [u8; 4]) -> RenderOutcome {
        RenderOutcome {
            panel_name: name.to_string(),
            image: RgbaImage::from_pixel(10, 10, Rgba(color)),
            elapsed: Duration::ZERO,
            error: None,
        }
    }

    #[test]
    fn placement_is_independent_of_outcome_order() {
        let panels = vec![spec("a", 0, None), spec("b", 20, None)];
        let forward = vec![outcome("a", [255, 0, 0, 255]), outcome("b", [0, 0, 255, 255])];
        let reversed: Vec<_> = forward.iter().rev().cloned().collect();

        let one = assemble(&device(), &[], &panels, &["a", "b"], &forward).unwrap();
        let two = assemble(&device(), &[], &panels, &["a", "b"], &reversed).unwrap();

        assert_eq!(one.as_rgba(), two.as_rgba());
        assert_eq!(one.as_rgba().get_pixel(5, 5), &Rgba([255, 0, 0, 255]));
        assert_eq!(one.as_rgba().get_pixel(25, 5), &Rgba([0, 0, 255, 255]));
        assert_eq!(one.as_rgba().get_pixel(15, 5), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn later_z_order_draws_on_top() {
        let panels = vec![spec("under", 0, None), spec("over", 0, None)];
        let outcomes = vec![outcome("under", [255, 0, 0, 255]), outcome("over", [0, 255, 0, 255])];

        let img = assemble(&device(), &[], &panels, &["under", "over"], &outcomes).unwrap();
        assert_eq!(img.as_rgba().get_pixel(0, 0), &Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn scale_resizes_before_placing() {
        let panels = vec![spec("a", 0, Some(2.0))];
        let outcomes = vec![outcome("a", [0, 0, 0, 255])];

        let img = assemble(&device(), &[], &panels, &["a"], &outcomes).unwrap();
        assert_eq!(img.as_rgba().get_pixel(19, 19)[0], 0);
        assert_eq!(img.as_rgba().get_pixel(21, 5), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn missing_outcome_is_an_assembly_error() {
        let panels = vec![spec("a", 0, None)];
        let err = assemble(&device(), &[], &panels, &["a"], &[]).unwrap_err();
        assert!(matches!(err, PanelError::RenderError { .. }));
    }

    #[test]
    fn gray_conversion_keeps_extremes_and_darkens_midtones() {
        let mut img = RgbaImage::from_pixel(3, 1, Rgba([255, 255, 255, 255]));
        img.put_pixel(1, 0, Rgba([0, 0, 0, 255]));
        img.put_pixel(2, 0, Rgba([255, 0, 0, 255]));

        let gray = CompositeImage::new(img).to_display_gray();
        assert_eq!(gray.get_pixel(0, 0)[0], 255);
        assert_eq!(gray.get_pixel(1, 0)[0], 0);
        // Linear-light luma of pure red is ~0.3, which re-encodes above 0.3*255.
        let red = gray.get_pixel(2, 0)[0];
        assert!(red > 76 && red < 255, "{red}");
    }

    #[test]
    fn encoded_png_decodes_to_device_size() {
        let png = CompositeImage::blank(&device()).encode_png().unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 20));
    }
}
