// src/render/placeholder.rs

//! Synthesized substitutes for content that could not be rendered.

use embedded_graphics::pixelcolor::Rgb888;
use image::{Rgba, RgbaImage};

use super::text::{char_width, draw_text, line_height, wrap_text};

/// Literal banner drawn on top of every placeholder.
pub const ERROR_BANNER: &str = "ERROR";

/// Column limit for the failure text under the banner.
pub const WRAP_COLUMNS: usize = 90;

const PANEL_BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 100]);
const CANVAS_BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BANNER_COLOR: Rgb888 = Rgb888::new(0x66, 0x66, 0x66);
const BODY_COLOR: Rgb888 = Rgb888::new(0x33, 0x33, 0x33);

/// Placeholder for a single panel whose renderer exhausted its retries.
///
/// Translucent background so whatever is beneath (wall images) stays visible.
pub fn panel_error_image(width: u32, height: u32, message: &str) -> RgbaImage {
    let mut img = RgbaImage::from_pixel(width.max(1), height.max(1), PANEL_BACKGROUND);
    draw_error(&mut img, message, WRAP_COLUMNS);
    img
}

/// Full-canvas error image used when the whole pipeline failed.
pub fn canvas_error_image(width: u32, height: u32, message: &str) -> RgbaImage {
    let mut img = RgbaImage::from_pixel(width.max(1), height.max(1), CANVAS_BACKGROUND);
    draw_error(&mut img, message, 100);
    img
}

fn draw_error(img: &mut RgbaImage, message: &str, columns: usize) {
    let banner_scale = banner_scale(img.width(), img.height());
    let body_scale = body_scale(img.width(), columns);

    let mut y = draw_text(img, ERROR_BANNER, (10, 10), banner_scale, BANNER_COLOR);
    y += 10;

    for line in wrap_text(message, columns) {
        if y >= img.height() as i64 {
            break;
        }
        y = draw_text(img, &line, (20, y), body_scale, BODY_COLOR) + 4;
    }
}

/// Largest banner scale (up to 8x) that fits in the top third of the image.
fn banner_scale(width: u32, height: u32) -> u32 {
    let by_height = (height / 3) / line_height();
    let by_width = width.saturating_sub(20) / (char_width() * ERROR_BANNER.len() as u32);
    by_height.min(by_width).clamp(1, 8)
}

fn body_scale(width: u32, columns: usize) -> u32 {
    if width >= char_width() * columns as u32 * 2 + 40 {
        2
    } else {
        1
    }
}
