// src/render/text.rs

//! Bitmap text drawing onto `image::RgbaImage`.
//!
//! Glyphs come from `embedded-graphics` monospace fonts, so the crate needs
//! no font files at runtime. [`ScaledCanvas`] adapts an RGBA buffer to
//! `DrawTarget` and blows every font pixel up to a `scale x scale` block.

use std::convert::Infallible;

use embedded_graphics::mono_font::ascii::FONT_10X20;
use embedded_graphics::mono_font::{MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};
use image::{Rgba, RgbaImage};

/// Font used for every piece of generated text.
pub const FONT: &MonoFont<'static> = &FONT_10X20;

/// Width in pixels of one character at scale 1.
pub fn char_width() -> u32 {
    FONT.character_size.width + FONT.character_spacing
}

/// Height in pixels of one line at scale 1.
pub fn line_height() -> u32 {
    FONT.character_size.height
}

/// `DrawTarget` over an RGBA image with integer upscaling and an origin offset.
pub struct ScaledCanvas<'a> {
    image: &'a mut RgbaImage,
    origin: (i64, i64),
    scale: u32,
}

impl<'a> ScaledCanvas<'a> {
    pub fn new(image: &'a mut RgbaImage, origin: (i64, i64), scale: u32) -> Self {
        Self {
            image,
            origin,
            scale: scale.max(1),
        }
    }

    fn fill_block(&mut self, x: i64, y: i64, color: Rgba<u8>) {
        let (width, height) = (self.image.width() as i64, self.image.height() as i64);
        let scale = self.scale as i64;

        for dy in 0..scale {
            for dx in 0..scale {
                let px = self.origin.0 + x * scale + dx;
                let py = self.origin.1 + y * scale + dy;
                if px >= 0 && py >= 0 && px < width && py < height {
                    self.image.put_pixel(px as u32, py as u32, color);
                }
            }
        }
    }
}

impl DrawTarget for ScaledCanvas<'_> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            let rgba = Rgba([color.r(), color.g(), color.b(), 255]);
            self.fill_block(point.x as i64, point.y as i64, rgba);
        }
        Ok(())
    }
}

impl OriginDimensions for ScaledCanvas<'_> {
    fn size(&self) -> Size {
        Size::new(
            self.image.width() / self.scale,
            self.image.height() / self.scale,
        )
    }
}

/// Draw a single line of text with its top-left corner at `pos`.
///
/// Returns the y coordinate just below the drawn line. Pixels falling outside
/// the image are clipped.
pub fn draw_text(image: &mut RgbaImage, text: &str, pos: (i64, i64), scale: u32, color: Rgb888) -> i64 {
    let scale = scale.max(1);
    let mut canvas = ScaledCanvas::new(image, pos, scale);
    let style = MonoTextStyle::new(FONT, color);

    // Infallible target.
    let _ = Text::with_baseline(text, Point::zero(), style, Baseline::Top).draw(&mut canvas);

    pos.1 + (line_height() * scale) as i64
}

/// Greedy word wrap to at most `width` columns. Words longer than a line are
/// split. Existing line breaks are kept.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();

    for raw_line in text.lines() {
        let mut current = String::new();

        for word in raw_line.split_whitespace() {
            let mut word = word;

            while word.chars().count() > width {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let split_at = word
                    .char_indices()
                    .nth(width)
                    .map(|(idx, _)| idx)
                    .unwrap_or(word.len());
                lines.push(word[..split_at].to_string());
                word = &word[split_at..];
            }

            if word.is_empty() {
                continue;
            }

            let needed = if current.is_empty() {
                word.chars().count()
            } else {
                current.chars().count() + 1 + word.chars().count()
            };

            if needed > width {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }

        if !current.is_empty() {
            lines.push(current);
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_respects_width_and_splits_long_words() {
        let lines = wrap_text("alpha beta gamma deltaepsilonzeta", 10);
        assert_eq!(lines, vec!["alpha beta", "gamma", "deltaepsil", "onzeta"]);
        assert!(lines.iter().all(|l| l.chars().count() <= 10));
    }

    #[test]
    fn wrap_keeps_existing_line_breaks() {
        let lines = wrap_text("first\nsecond line", 80);
        assert_eq!(lines, vec!["first", "second line"]);
    }

    #[test]
    fn draw_text_marks_pixels_and_clips() {
        let mut img = RgbaImage::from_pixel(40, 20, Rgba([255, 255, 255, 255]));
        let below = draw_text(&mut img, "X", (0, 0), 1, Rgb888::BLACK);
        assert_eq!(below, line_height() as i64);
        assert!(img.pixels().any(|p| p.0[0] == 0));

        // Entirely off-canvas: must not panic.
        draw_text(&mut img, "X", (-500, -500), 3, Rgb888::BLACK);
    }
}
