use image::RgbaImage;

/// Hue blended over the frame for warmth.
pub const WARM_HUE: [u8; 3] = [255, 152, 0];

/// Overlay blend of one channel, both in 0.0–1.0.
fn overlay_channel(base: f32, blend: f32) -> f32 {
    if base <= 0.5 {
        2.0 * base * blend
    } else {
        1.0 - 2.0 * (1.0 - base) * (1.0 - blend)
    }
}

/// Blend [`WARM_HUE`] over the whole frame with the overlay blend mode at
/// opacity `warmth / 500`. No-op at zero warmth.
pub fn apply_warmth(frame: &mut RgbaImage, warmth: f32) {
    if warmth <= 0.0 {
        return;
    }
    let opacity = (warmth / 500.0).clamp(0.0, 1.0);
    let hue = WARM_HUE.map(|c| c as f32 / 255.0);

    for pixel in frame.pixels_mut() {
        for (channel, blend) in pixel.0.iter_mut().zip(hue) {
            let base = *channel as f32 / 255.0;
            let mixed = base * (1.0 - opacity) + overlay_channel(base, blend) * opacity;
            *channel = (mixed.clamp(0.0, 1.0) * 255.0).round() as u8;
        }
    }
}
