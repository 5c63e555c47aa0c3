//! The compositing pipeline: source pixels plus an [`AdjustmentSet`] plus
//! detected regions in, final pixels out.
//!
//! Stages always run in this order, for preview and export alike:
//!
//! 1. redaction of detected regions (when privacy blur is on)
//! 2. tone filters
//! 3. warmth
//! 4. element overlay
//! 5. text watermark
//!
//! Redacting first means no later stage can reveal or smear the original
//! pixels of a redacted region.

mod overlay;
mod redact;
mod tone;
mod warmth;
mod watermark;

pub use overlay::{draw_overlay, overlay_size};
pub use redact::{block_size, redact_regions};
pub use tone::apply_tone;
pub use warmth::{WARM_HUE, apply_warmth};
pub use watermark::{WatermarkGeometry, WatermarkRenderer};

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::config::CompositingConfig;
use crate::error::CompositeError;
use crate::model::{AdjustmentSet, DetectionRegion};

/// Fidelity of a compositing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Downscaled frame, fast approximations, lenient about bad regions.
    Preview,
    /// Full resolution, exact filters, every failure is fatal.
    Export,
}

/// Runs the five compositing stages over a frame.
///
/// # Example
///
/// ```rust,no_run
/// use retouch_ai::compose::{Compositor, RenderMode};
/// use retouch_ai::config::CompositingConfig;
/// use retouch_ai::model::AdjustmentSet;
///
/// let compositor = Compositor::new(CompositingConfig::default());
/// let source = image::open("photo.jpg").unwrap();
/// let adj = AdjustmentSet::default().with_sepia(40.0).with_watermark("© Studio");
/// let frame = compositor.compose(&source, &adj, None, RenderMode::Preview).unwrap();
/// println!("{}x{}", frame.width(), frame.height());
/// ```
pub struct Compositor {
    config: CompositingConfig,
    text: WatermarkRenderer,
}

impl Compositor {
    pub fn new(config: CompositingConfig) -> Self {
        let text = WatermarkRenderer::new(config.font_path.as_deref());
        Self { config, text }
    }

    pub fn config(&self) -> &CompositingConfig {
        &self.config
    }

    /// Composite `source` with `adjustments`.
    ///
    /// `regions` is the image's region state; it is only used when
    /// `adjustments.privacy_blur` is set.
    pub fn compose(
        &self,
        source: &DynamicImage,
        adjustments: &AdjustmentSet,
        regions: Option<&[DetectionRegion]>,
        mode: RenderMode,
    ) -> Result<RgbaImage, CompositeError> {
        let adj = adjustments.clamped();
        let (mut frame, factor) = self.prepare_frame(source, mode);
        let (width, height) = frame.dimensions();
        log::debug!("Compositing {width}x{height} frame ({mode:?})");

        // 1. redaction
        if adj.privacy_blur {
            if let Some(regions) = regions.filter(|r| !r.is_empty()) {
                let block = block_size(
                    width,
                    self.config.pixel_block_divisor,
                    self.config.min_pixel_block,
                );
                let strict = mode == RenderMode::Export;
                redact_regions(&mut frame, regions, block, strict)?;
            }
        }

        // 2. tone
        if !adj.is_tone_neutral() {
            apply_tone(&mut frame, &adj, adj.blur * factor, mode);
        }

        // 3. warmth
        apply_warmth(&mut frame, adj.warmth);

        // 4. overlay
        if let Some(overlay) = &adj.overlay {
            match draw_overlay(&mut frame, overlay, mode) {
                Ok(()) => {}
                Err(e) if mode == RenderMode::Preview => {
                    log::warn!("Skipping overlay in preview: {e}");
                }
                Err(e) => return Err(e),
            }
        }

        // 5. watermark
        self.text.draw(&mut frame, &adj.watermark);

        Ok(frame)
    }

    /// Decode `bytes` and [`compose`](Self::compose).
    pub fn compose_bytes(
        &self,
        bytes: &[u8],
        adjustments: &AdjustmentSet,
        regions: Option<&[DetectionRegion]>,
        mode: RenderMode,
    ) -> Result<RgbaImage, CompositeError> {
        let source = image::load_from_memory(bytes).map_err(CompositeError::Decode)?;
        self.compose(&source, adjustments, regions, mode)
    }

    /// Full-resolution composite of `bytes`, encoded as `format`.
    pub fn render_encoded(
        &self,
        bytes: &[u8],
        adjustments: &AdjustmentSet,
        regions: Option<&[DetectionRegion]>,
        format: ImageFormat,
    ) -> Result<Vec<u8>, CompositeError> {
        let frame = self.compose_bytes(bytes, adjustments, regions, RenderMode::Export)?;
        encode(frame, format)
    }

    /// The working frame for `mode` and its scale relative to the source.
    fn prepare_frame(&self, source: &DynamicImage, mode: RenderMode) -> (RgbaImage, f32) {
        let max_dim = self.config.preview_max_dimension.max(1);
        let (w, h) = (source.width(), source.height());
        if mode == RenderMode::Export || w.max(h) <= max_dim {
            return (source.to_rgba8(), 1.0);
        }
        let scaled = source.resize(max_dim, max_dim, FilterType::Triangle);
        let factor = scaled.width() as f32 / w as f32;
        (scaled.to_rgba8(), factor)
    }
}

/// Encode a frame. Formats without an alpha channel get the RGB pixels.
pub fn encode(frame: RgbaImage, format: ImageFormat) -> Result<Vec<u8>, CompositeError> {
    let image = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(frame).to_rgb8()),
        _ => DynamicImage::ImageRgba8(frame),
    };
    let mut out = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut out), format)
        .map_err(CompositeError::Encode)?;
    Ok(out)
}
