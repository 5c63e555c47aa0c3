use image::{Rgba, RgbaImage};

use crate::error::CompositeError;
use crate::model::DetectionRegion;

/// Pixelation block size for a frame: `width / divisor`, never below `min_block`.
pub fn block_size(width: u32, divisor: u32, min_block: u32) -> u32 {
    (width / divisor.max(1)).max(min_block).max(1)
}

/// Pixelate every region by block averaging.
///
/// With `strict`, the first invalid region aborts with
/// [`CompositeError::InvalidRegion`]; otherwise invalid regions are logged
/// and skipped. Returns the number of regions redacted.
pub fn redact_regions(
    frame: &mut RgbaImage,
    regions: &[DetectionRegion],
    block: u32,
    strict: bool,
) -> Result<usize, CompositeError> {
    let (width, height) = frame.dimensions();
    let mut redacted = 0;

    for region in regions {
        let Some((x, y, w, h)) = region.to_pixels(width, height) else {
            let err = CompositeError::InvalidRegion {
                ymin: region.ymin,
                xmin: region.xmin,
                ymax: region.ymax,
                xmax: region.xmax,
            };
            if strict {
                return Err(err);
            }
            log::warn!("Skipping region: {err}");
            continue;
        };
        pixelate(frame, x, y, w, h, block);
        redacted += 1;
    }

    Ok(redacted)
}

/// Replace every `block`×`block` cell of the rectangle with its mean colour.
///
/// Cells are aligned to the rectangle's top-left corner and clipped to it.
fn pixelate(frame: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, block: u32) {
    let block = block.max(1);
    let (x_end, y_end) = (x + w, y + h);

    for by in (y..y_end).step_by(block as usize) {
        let cell_h = block.min(y_end - by);
        for bx in (x..x_end).step_by(block as usize) {
            let cell_w = block.min(x_end - bx);

            let mut sum = [0u64; 4];
            for py in by..by + cell_h {
                for px in bx..bx + cell_w {
                    let p = frame.get_pixel(px, py);
                    for (s, c) in sum.iter_mut().zip(p.0) {
                        *s += c as u64;
                    }
                }
            }

            let count = (cell_w as u64) * (cell_h as u64);
            let mean = Rgba(sum.map(|s| ((s + count / 2) / count) as u8));
            for py in by..by + cell_h {
                for px in bx..bx + cell_w {
                    frame.put_pixel(px, py, mean);
                }
            }
        }
    }
}
