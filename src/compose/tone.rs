//! Whole-frame tone filters with CSS filter-effect semantics.
//!
//! Applied in a fixed order: brightness, contrast, saturation, blur, sepia,
//! grayscale. Each colour step clamps to the displayable range before the
//! next one, the way a chain of CSS filter functions does.

use image::RgbaImage;
use image::imageops;

use super::RenderMode;
use crate::model::AdjustmentSet;

type Matrix = [[f32; 3]; 3];

fn saturate_matrix(s: f32) -> Matrix {
    [
        [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
    ]
}

fn sepia_matrix(amount: f32) -> Matrix {
    let k = 1.0 - amount;
    [
        [0.393 + 0.607 * k, 0.769 - 0.769 * k, 0.189 - 0.189 * k],
        [0.349 - 0.349 * k, 0.686 + 0.314 * k, 0.168 - 0.168 * k],
        [0.272 - 0.272 * k, 0.534 - 0.534 * k, 0.131 + 0.869 * k],
    ]
}

fn grayscale_matrix(amount: f32) -> Matrix {
    let k = 1.0 - amount;
    [
        [0.2126 + 0.7874 * k, 0.7152 - 0.7152 * k, 0.0722 - 0.0722 * k],
        [0.2126 - 0.2126 * k, 0.7152 + 0.2848 * k, 0.0722 - 0.0722 * k],
        [0.2126 - 0.2126 * k, 0.7152 - 0.7152 * k, 0.0722 + 0.9278 * k],
    ]
}

fn apply_matrix(m: &Matrix, rgb: [f32; 3]) -> [f32; 3] {
    let mut out = [0.0; 3];
    for (o, row) in out.iter_mut().zip(m) {
        *o = (row[0] * rgb[0] + row[1] * rgb[1] + row[2] * rgb[2]).clamp(0.0, 1.0);
    }
    out
}

/// A per-pixel colour step.
enum ColorStep {
    Brightness(f32),
    Contrast(f32),
    Matrix(Matrix),
}

impl ColorStep {
    fn apply(&self, rgb: [f32; 3]) -> [f32; 3] {
        match self {
            Self::Brightness(b) => rgb.map(|c| (c * b).clamp(0.0, 1.0)),
            Self::Contrast(k) => rgb.map(|c| ((c - 0.5) * k + 0.5).clamp(0.0, 1.0)),
            Self::Matrix(m) => apply_matrix(m, rgb),
        }
    }
}

fn run_steps(frame: &mut RgbaImage, steps: &[ColorStep]) {
    if steps.is_empty() {
        return;
    }
    for pixel in frame.pixels_mut() {
        let mut rgb = [pixel[0], pixel[1], pixel[2]].map(|c| c as f32 / 255.0);
        for step in steps {
            rgb = step.apply(rgb);
        }
        for (channel, value) in pixel.0.iter_mut().zip(rgb) {
            *channel = (value * 255.0).round() as u8;
        }
    }
}

/// Apply the tone chain of `adj` to the whole frame.
///
/// `blur_radius` is the blur in frame pixels (already scaled for preview
/// frames). Preview uses the fast box approximation, export a true Gaussian.
pub fn apply_tone(frame: &mut RgbaImage, adj: &AdjustmentSet, blur_radius: f32, mode: RenderMode) {
    let mut before_blur = Vec::new();
    if adj.brightness != 100.0 {
        before_blur.push(ColorStep::Brightness(adj.brightness / 100.0));
    }
    if adj.contrast != 100.0 {
        before_blur.push(ColorStep::Contrast(adj.contrast / 100.0));
    }
    if adj.saturation != 100.0 {
        before_blur.push(ColorStep::Matrix(saturate_matrix(adj.saturation / 100.0)));
    }
    run_steps(frame, &before_blur);

    if blur_radius > 0.0 {
        *frame = match mode {
            RenderMode::Preview => imageops::fast_blur(frame, blur_radius),
            RenderMode::Export => imageops::blur(frame, blur_radius),
        };
    }

    let mut after_blur = Vec::new();
    if adj.sepia > 0.0 {
        after_blur.push(ColorStep::Matrix(sepia_matrix(adj.sepia / 100.0)));
    }
    if adj.grayscale > 0.0 {
        after_blur.push(ColorStep::Matrix(grayscale_matrix(adj.grayscale / 100.0)));
    }
    run_steps(frame, &after_blur);
}
