use image::imageops::{self, FilterType};
use image::RgbaImage;

use super::RenderMode;
use crate::error::CompositeError;
use crate::model::Overlay;

/// Pixel size of the overlay on a frame: width is `frame_width * scale`,
/// height keeps the overlay's aspect ratio. Never below 1×1.
pub fn overlay_size(frame_width: u32, overlay: (u32, u32), scale: f32) -> (u32, u32) {
    let (ow, oh) = overlay;
    let width = ((frame_width as f32 * scale).round() as u32).max(1);
    let height = if ow == 0 {
        1
    } else {
        ((width as f64 * oh as f64 / ow as f64).round() as u32).max(1)
    };
    (width, height)
}

/// Largest resampled overlay piece, in pixels.
pub const MAX_OVERLAY_PIXELS: u64 = 8192 * 8192;

/// Decode, scale, and alpha-composite `overlay` centred at its normalized
/// position.
///
/// Only the source pixels that land on the frame are resampled, so a huge
/// scale costs no more than the visible part.
pub fn draw_overlay(
    frame: &mut RgbaImage,
    overlay: &Overlay,
    mode: RenderMode,
) -> Result<(), CompositeError> {
    let overlay = overlay.clamped();
    let decoded = image::load_from_memory(&overlay.bytes).map_err(CompositeError::Decode)?;
    let (src_w, src_h) = (decoded.width(), decoded.height());
    if src_w == 0 || src_h == 0 {
        return Ok(());
    }

    let (frame_w, frame_h) = frame.dimensions();
    let (w, h) = overlay_size(frame_w, (src_w, src_h), overlay.scale);
    let left = (overlay.x as f64 * frame_w as f64 - w as f64 / 2.0).round() as i64;
    let top = (overlay.y as f64 * frame_h as f64 - h as f64 / 2.0).round() as i64;

    let Some((sx0, sx1)) = visible_span(left, w, frame_w, src_w) else {
        return Ok(());
    };
    let Some((sy0, sy1)) = visible_span(top, h, frame_h, src_h) else {
        return Ok(());
    };

    // the source crop at overlay scale, and where it sits on the frame
    let fx = w as f64 / src_w as f64;
    let fy = h as f64 / src_h as f64;
    let piece_w = (((sx1 - sx0) as f64 * fx).round() as u32).max(1);
    let piece_h = (((sy1 - sy0) as f64 * fy).round() as u32).max(1);
    if piece_w as u64 * piece_h as u64 > MAX_OVERLAY_PIXELS {
        return Err(CompositeError::OverlayTooLarge {
            width: piece_w,
            height: piece_h,
        });
    }
    let piece_left = left + (sx0 as f64 * fx).round() as i64;
    let piece_top = top + (sy0 as f64 * fy).round() as i64;

    let filter = match mode {
        RenderMode::Preview => FilterType::Triangle,
        RenderMode::Export => FilterType::Lanczos3,
    };
    let mut scaled = decoded
        .crop_imm(sx0, sy0, sx1 - sx0, sy1 - sy0)
        .resize_exact(piece_w, piece_h, filter)
        .to_rgba8();

    if overlay.opacity < 1.0 {
        for pixel in scaled.pixels_mut() {
            pixel[3] = (pixel[3] as f32 * overlay.opacity).round() as u8;
        }
    }

    imageops::overlay(frame, &scaled, piece_left, piece_top);
    Ok(())
}

/// Source pixel range `[start, end)` covering the on-frame part of a span
/// placed at `offset` with scaled length `len`, plus one pixel of filter
/// context on each side. `None` when nothing is visible.
fn visible_span(offset: i64, len: u32, frame_len: u32, src_len: u32) -> Option<(u32, u32)> {
    let start = offset.max(0);
    let end = (offset + len as i64).min(frame_len as i64);
    if start >= end {
        return None;
    }
    let per_pixel = len as f64 / src_len as f64;
    let s0 = ((start - offset) as f64 / per_pixel).floor() as u32;
    let s1 = ((end - offset) as f64 / per_pixel).ceil() as u32;
    let s0 = s0.saturating_sub(1).min(src_len - 1);
    let s1 = s1.saturating_add(1).clamp(s0 + 1, src_len);
    Some((s0, s1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::io::Cursor;

    fn png(width: u32, height: u32, color: Rgba<u8>) -> Vec<u8> {
        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, color))
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn size_follows_frame_width_and_aspect() {
        assert_eq!(overlay_size(1000, (400, 200), 0.2), (200, 100));
        assert_eq!(overlay_size(500, (100, 300), 0.5), (250, 750));
        assert_eq!(overlay_size(10, (100, 100), 0.0), (1, 1));
    }

    #[test]
    fn default_overlay_is_centered() {
        let mut frame = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255]));
        let overlay = Overlay::new(png(10, 10, Rgba([255, 0, 0, 255])));
        draw_overlay(&mut frame, &overlay, RenderMode::Export).unwrap();

        // 20x20 square centred at (50, 50)
        assert_eq!(*frame.get_pixel(50, 50), Rgba([255, 0, 0, 255]));
        assert_eq!(*frame.get_pixel(41, 41), Rgba([255, 0, 0, 255]));
        assert_eq!(*frame.get_pixel(38, 50), Rgba([0, 0, 0, 255]));
        assert_eq!(*frame.get_pixel(61, 50), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn position_and_opacity_are_respected() {
        let mut frame = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255]));
        let overlay = Overlay {
            x: 0.0,
            y: 0.0,
            scale: 0.2,
            opacity: 0.5,
            ..Overlay::new(png(4, 4, Rgba([255, 255, 255, 255])))
        };
        draw_overlay(&mut frame, &overlay, RenderMode::Preview).unwrap();

        // only the lower-right quarter of the overlay lands on the frame
        let p = frame.get_pixel(2, 2);
        assert!((120..=135).contains(&p[0]), "{p:?}");
        assert_eq!(*frame.get_pixel(20, 20), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn visible_span_clips_to_frame() {
        // fully visible
        assert_eq!(visible_span(40, 20, 100, 10), Some((0, 10)));
        // left half off-frame: source columns 4.. plus one of context
        assert_eq!(visible_span(-10, 20, 100, 10), Some((4, 10)));
        // entirely off-frame
        assert_eq!(visible_span(100, 20, 100, 10), None);
        assert_eq!(visible_span(-30, 20, 100, 10), None);
    }

    #[test]
    fn huge_thin_overlay_only_resamples_visible_part() {
        // 1x2000 at scale 4 would be 400x800000 if resampled whole
        let mut frame = RgbaImage::from_pixel(100, 80, Rgba([0, 0, 0, 255]));
        let overlay = Overlay {
            scale: 4.0,
            ..Overlay::new(png(1, 2000, Rgba([0, 255, 0, 255])))
        };
        draw_overlay(&mut frame, &overlay, RenderMode::Export).unwrap();
        assert_eq!(*frame.get_pixel(0, 0), Rgba([0, 255, 0, 255]));
        assert_eq!(*frame.get_pixel(99, 79), Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn oversized_piece_is_an_error() {
        // each source pixel alone scales past the cap
        let mut frame = RgbaImage::new(4000, 10);
        let overlay = Overlay {
            scale: 4.0,
            ..Overlay::new(png(1, 2000, Rgba([0, 255, 0, 255])))
        };
        assert!(matches!(
            draw_overlay(&mut frame, &overlay, RenderMode::Preview),
            Err(CompositeError::OverlayTooLarge { .. })
        ));
    }

    #[test]
    fn off_frame_overlay_is_noop() {
        let mut frame = RgbaImage::from_pixel(50, 50, Rgba([9, 9, 9, 255]));
        let before = frame.clone();
        let overlay = Overlay {
            x: 1.0,
            y: 1.0,
            scale: 0.01,
            ..Overlay::new(png(10, 10, Rgba([255, 0, 0, 255])))
        };
        draw_overlay(&mut frame, &overlay, RenderMode::Export).unwrap();
        assert_eq!(frame, before);
    }

    #[test]
    fn undecodable_overlay_is_an_error() {
        let mut frame = RgbaImage::new(10, 10);
        let overlay = Overlay::new(b"garbage".to_vec());
        assert!(matches!(
            draw_overlay(&mut frame, &overlay, RenderMode::Export),
            Err(CompositeError::Decode(_))
        ));
    }
}
