//! Bottom-right text watermark with a soft drop shadow.

use cosmic_text::{Attrs, Buffer, Color, Family, FontSystem, Metrics, Shaping, SwashCache, Wrap};
use image::{GrayImage, Luma, RgbaImage, imageops};
use parking_lot::Mutex;

/// Fill alpha of the watermark text.
const TEXT_ALPHA: f32 = 0.8;
/// Peak alpha of the shadow.
const SHADOW_ALPHA: f32 = 0.5;
const MIN_FONT_SIZE: f32 = 12.0;

/// Size and placement of a watermark, all derived from the frame width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatermarkGeometry {
    pub font_size: f32,
    pub padding: f32,
    pub shadow_offset: f32,
}

impl WatermarkGeometry {
    pub fn for_width(width: u32) -> Self {
        let font_size = (width as f32 * 0.04).max(MIN_FONT_SIZE);
        Self {
            font_size,
            padding: font_size / 2.0,
            shadow_offset: font_size * 2.0 / 25.0,
        }
    }
}

/// Shapes and rasterizes watermark text.
///
/// Font discovery is expensive, so one renderer is built per compositor and
/// shared across frames.
pub struct WatermarkRenderer {
    fonts: Mutex<FontSystem>,
    cache: Mutex<SwashCache>,
    family: Option<String>,
}

impl WatermarkRenderer {
    /// Load system fonts, plus `font_path` when given. A configured font that
    /// cannot be read is reported and the system sans-serif is used instead.
    pub fn new(font_path: Option<&str>) -> Self {
        let mut fonts = FontSystem::new();
        let family = font_path.and_then(|path| match std::fs::read(path) {
            Ok(data) => {
                fonts.db_mut().load_font_data(data);
                let name = fonts
                    .db()
                    .faces()
                    .last()
                    .and_then(|face| face.families.first())
                    .map(|(name, _)| name.clone());
                log::debug!("Watermark font loaded from {path}: {name:?}");
                name
            }
            Err(e) => {
                log::warn!("Cannot read watermark font {path}: {e}; using system sans-serif");
                None
            }
        });

        Self {
            fonts: Mutex::new(fonts),
            cache: Mutex::new(SwashCache::new()),
            family,
        }
    }

    /// Whether any font face was found. Without one nothing is ever drawn.
    pub fn has_fonts(&self) -> bool {
        !self.fonts.lock().db().is_empty()
    }

    /// Draw `text` in the bottom-right corner of `frame`. Blank text is a no-op.
    pub fn draw(&self, frame: &mut RgbaImage, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let geometry = WatermarkGeometry::for_width(frame.width());
        let sigma = geometry.shadow_offset.max(1.0);
        let margin = (geometry.shadow_offset + sigma * 3.0).ceil() as u32;

        let Some((mask, text_w, text_h)) = self.rasterize(text, geometry.font_size, margin) else {
            log::warn!("No glyphs available to render watermark");
            return;
        };

        // top-left of the text box on the frame
        let left = frame.width() as f32 - geometry.padding - text_w;
        let top = frame.height() as f32 - geometry.padding - text_h;
        let origin_x = left.round() as i64 - margin as i64;
        let origin_y = top.round() as i64 - margin as i64;

        let shadow = imageops::blur(&mask, sigma);
        let offset = geometry.shadow_offset.round() as i64;
        blend_mask(frame, &shadow, origin_x + offset, origin_y + offset, [0, 0, 0], SHADOW_ALPHA);
        blend_mask(frame, &mask, origin_x, origin_y, [255, 255, 255], TEXT_ALPHA);
    }

    /// Coverage mask of the shaped text with `margin` pixels on every side,
    /// plus the logical text width and height.
    fn rasterize(&self, text: &str, font_size: f32, margin: u32) -> Option<(GrayImage, f32, f32)> {
        let mut fonts = self.fonts.lock();
        let mut cache = self.cache.lock();

        let metrics = Metrics::new(font_size, font_size * 1.2);
        let mut buffer = Buffer::new(&mut fonts, metrics);
        buffer.set_wrap(&mut fonts, Wrap::None);
        let attrs = match &self.family {
            Some(name) => Attrs::new().family(Family::Name(name)),
            None => Attrs::new().family(Family::SansSerif),
        };
        buffer.set_text(&mut fonts, text, &attrs, Shaping::Advanced);
        buffer.shape_until_scroll(&mut fonts, false);

        let (width, lines) = buffer
            .layout_runs()
            .fold((0.0f32, 0usize), |(w, n), run| (w.max(run.line_w), n + 1));
        if width <= 0.0 || lines == 0 {
            return None;
        }
        let height = lines as f32 * metrics.line_height;

        let mut mask = GrayImage::new(
            width.ceil() as u32 + margin * 2,
            height.ceil() as u32 + margin * 2,
        );
        buffer.draw(&mut fonts, &mut cache, Color::rgb(255, 255, 255), |x, y, w, h, color| {
            for py in y..y + h as i32 {
                for px in x..x + w as i32 {
                    let (mx, my) = (px + margin as i32, py + margin as i32);
                    if mx < 0 || my < 0 || mx as u32 >= mask.width() || my as u32 >= mask.height() {
                        continue;
                    }
                    let cell = mask.get_pixel_mut(mx as u32, my as u32);
                    *cell = Luma([cell[0].max(color.a())]);
                }
            }
        });

        Some((mask, width, height))
    }
}

/// Blend a solid colour through `mask` onto `frame` at the given offset.
fn blend_mask(frame: &mut RgbaImage, mask: &GrayImage, left: i64, top: i64, rgb: [u8; 3], alpha: f32) {
    let (fw, fh) = (frame.width() as i64, frame.height() as i64);
    for (mx, my, coverage) in mask.enumerate_pixels() {
        if coverage[0] == 0 {
            continue;
        }
        let (x, y) = (left + mx as i64, top + my as i64);
        if x < 0 || y < 0 || x >= fw || y >= fh {
            continue;
        }
        let a = coverage[0] as f32 / 255.0 * alpha;
        let pixel = frame.get_pixel_mut(x as u32, y as u32);
        for (channel, src) in pixel.0.iter_mut().zip(rgb) {
            *channel = (src as f32 * a + *channel as f32 * (1.0 - a)).round() as u8;
        }
        pixel[3] = pixel[3].max((a * 255.0).round() as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn geometry_scales_with_width() {
        let g = WatermarkGeometry::for_width(1000);
        assert_eq!(g.font_size, 40.0);
        assert_eq!(g.padding, 20.0);
        assert!((g.shadow_offset - 3.2).abs() < 1e-4);

        let small = WatermarkGeometry::for_width(100);
        assert_eq!(small.font_size, MIN_FONT_SIZE);
    }

    #[test]
    fn blank_text_is_noop() {
        let renderer = WatermarkRenderer::new(None);
        let mut frame = RgbaImage::from_pixel(64, 64, Rgba([30, 60, 90, 255]));
        let before = frame.clone();
        renderer.draw(&mut frame, "   ");
        assert_eq!(frame, before);
    }

    #[test]
    fn text_stays_in_bottom_right() {
        let renderer = WatermarkRenderer::new(None);
        let mut frame = RgbaImage::from_pixel(400, 300, Rgba([30, 60, 90, 255]));
        let before = frame.clone();
        renderer.draw(&mut frame, "© 2024");
        if !renderer.has_fonts() {
            eprintln!("no fonts installed, skipping");
            return;
        }

        let mut changed = 0;
        for (x, y, p) in frame.enumerate_pixels() {
            if p != before.get_pixel(x, y) {
                assert!(x >= 200 && y >= 150, "pixel changed at ({x},{y})");
                changed += 1;
            }
        }
        assert!(changed > 0, "nothing was drawn");
    }

    #[test]
    fn unreadable_font_falls_back() {
        let renderer = WatermarkRenderer::new(Some("/nonexistent/font.ttf"));
        assert!(renderer.family.is_none());
    }

    #[test]
    fn blend_mask_mixes_and_clips() {
        let mut frame = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let mask = GrayImage::from_pixel(3, 3, Luma([255]));
        blend_mask(&mut frame, &mask, 2, 2, [200, 200, 200], 0.5);
        assert_eq!(*frame.get_pixel(3, 3), Rgba([100, 100, 100, 255]));
        assert_eq!(*frame.get_pixel(1, 1), Rgba([0, 0, 0, 255]));
    }
}
