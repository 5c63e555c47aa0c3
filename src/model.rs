//! Value types describing an edit: [`AdjustmentSet`], [`Overlay`], and
//! [`DetectionRegion`].
//!
//! An `AdjustmentSet` is replaced, never mutated in place. Every `with_*`
//! method returns a fresh value, so copies handed to several images never
//! alias.

use serde::{Deserialize, Serialize};

/// Scale of [`DetectionRegion`] coordinates, independent of pixel size.
pub const REGION_SCALE: i32 = 1000;

/// Overlay geometry used when an image has no overlay configured.
pub const DEFAULT_OVERLAY_SCALE: f32 = 0.2;
pub const DEFAULT_OVERLAY_OPACITY: f32 = 1.0;
pub const DEFAULT_OVERLAY_CENTER: f32 = 0.5;

/// Stable identity of an image within a [`Workspace`](crate::workspace::Workspace).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageId(pub u64);

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Every edit applied to one image.
///
/// Tone parameters follow CSS filter units:
///
/// | field        | unit    | range | neutral |
/// |--------------|---------|-------|---------|
/// | `brightness` | percent | 0–200 | 100     |
/// | `contrast`   | percent | 0–200 | 100     |
/// | `saturation` | percent | 0–200 | 100     |
/// | `blur`       | pixels  | 0–20  | 0       |
/// | `sepia`      | percent | 0–100 | 0       |
/// | `grayscale`  | percent | 0–100 | 0       |
/// | `warmth`     | percent | 0–100 | 0       |
///
/// # Example
///
/// ```rust
/// use retouch_ai::model::AdjustmentSet;
///
/// let base = AdjustmentSet::default();
/// let edited = base.with_brightness(120.0).with_watermark("© Studio");
/// assert_eq!(base.brightness, 100.0);
/// assert_eq!(edited.brightness, 120.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjustmentSet {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub blur: f32,
    pub sepia: f32,
    pub grayscale: f32,
    pub warmth: f32,
    pub watermark: String,
    pub overlay: Option<Overlay>,
    pub privacy_blur: bool,
}

impl Default for AdjustmentSet {
    fn default() -> Self {
        Self {
            brightness: 100.0,
            contrast: 100.0,
            saturation: 100.0,
            blur: 0.0,
            sepia: 0.0,
            grayscale: 0.0,
            warmth: 0.0,
            watermark: String::new(),
            overlay: None,
            privacy_blur: false,
        }
    }
}

impl AdjustmentSet {
    /// Copy with every numeric field clamped to its range.
    pub fn clamped(&self) -> Self {
        Self {
            brightness: clamp(self.brightness, 0.0, 200.0, 100.0),
            contrast: clamp(self.contrast, 0.0, 200.0, 100.0),
            saturation: clamp(self.saturation, 0.0, 200.0, 100.0),
            blur: clamp(self.blur, 0.0, 20.0, 0.0),
            sepia: clamp(self.sepia, 0.0, 100.0, 0.0),
            grayscale: clamp(self.grayscale, 0.0, 100.0, 0.0),
            warmth: clamp(self.warmth, 0.0, 100.0, 0.0),
            watermark: self.watermark.clone(),
            overlay: self.overlay.as_ref().map(Overlay::clamped),
            privacy_blur: self.privacy_blur,
        }
    }

    /// True when the tone stage would leave pixels untouched.
    pub fn is_tone_neutral(&self) -> bool {
        self.brightness == 100.0
            && self.contrast == 100.0
            && self.saturation == 100.0
            && self.blur == 0.0
            && self.sepia == 0.0
            && self.grayscale == 0.0
    }

    pub fn with_brightness(&self, value: f32) -> Self {
        Self {
            brightness: value,
            ..self.clone()
        }
    }

    pub fn with_contrast(&self, value: f32) -> Self {
        Self {
            contrast: value,
            ..self.clone()
        }
    }

    pub fn with_saturation(&self, value: f32) -> Self {
        Self {
            saturation: value,
            ..self.clone()
        }
    }

    pub fn with_blur(&self, value: f32) -> Self {
        Self {
            blur: value,
            ..self.clone()
        }
    }

    pub fn with_sepia(&self, value: f32) -> Self {
        Self {
            sepia: value,
            ..self.clone()
        }
    }

    pub fn with_grayscale(&self, value: f32) -> Self {
        Self {
            grayscale: value,
            ..self.clone()
        }
    }

    pub fn with_warmth(&self, value: f32) -> Self {
        Self {
            warmth: value,
            ..self.clone()
        }
    }

    pub fn with_watermark(&self, text: impl Into<String>) -> Self {
        Self {
            watermark: text.into(),
            ..self.clone()
        }
    }

    pub fn with_overlay(&self, overlay: Option<Overlay>) -> Self {
        Self {
            overlay,
            ..self.clone()
        }
    }

    pub fn with_privacy_blur(&self, enabled: bool) -> Self {
        Self {
            privacy_blur: enabled,
            ..self.clone()
        }
    }
}

fn clamp(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

/// An image drawn over the frame after tone and warmth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    /// Encoded image bytes (PNG, JPEG, ...).
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
    /// Normalized center, 0.0–1.0 of the frame width.
    #[serde(default = "default_center")]
    pub x: f32,
    /// Normalized center, 0.0–1.0 of the frame height.
    #[serde(default = "default_center")]
    pub y: f32,
    /// Overlay width as a fraction of the frame width.
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
}

fn default_center() -> f32 {
    DEFAULT_OVERLAY_CENTER
}

fn default_scale() -> f32 {
    DEFAULT_OVERLAY_SCALE
}

fn default_opacity() -> f32 {
    DEFAULT_OVERLAY_OPACITY
}

impl Overlay {
    /// An overlay with the default geometry.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            x: DEFAULT_OVERLAY_CENTER,
            y: DEFAULT_OVERLAY_CENTER,
            scale: DEFAULT_OVERLAY_SCALE,
            opacity: DEFAULT_OVERLAY_OPACITY,
        }
    }

    pub fn clamped(&self) -> Self {
        Self {
            bytes: self.bytes.clone(),
            x: clamp(self.x, 0.0, 1.0, DEFAULT_OVERLAY_CENTER),
            y: clamp(self.y, 0.0, 1.0, DEFAULT_OVERLAY_CENTER),
            scale: clamp(self.scale, 0.01, 4.0, DEFAULT_OVERLAY_SCALE),
            opacity: clamp(self.opacity, 0.0, 1.0, DEFAULT_OVERLAY_OPACITY),
        }
    }
}

/// A box to redact, on a 0–1000 scale in both axes.
///
/// Mapped onto pixels only at compositing time, against whatever dimensions
/// the frame has then.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionRegion {
    pub ymin: i32,
    pub xmin: i32,
    pub ymax: i32,
    pub xmax: i32,
}

impl DetectionRegion {
    pub fn new(ymin: i32, xmin: i32, ymax: i32, xmax: i32) -> Self {
        Self { ymin, xmin, ymax, xmax }
    }

    /// Bounds inside the 0–1000 scale with positive area.
    pub fn is_valid(&self) -> bool {
        let in_range = |v: i32| (0..=REGION_SCALE).contains(&v);
        in_range(self.ymin)
            && in_range(self.xmin)
            && in_range(self.ymax)
            && in_range(self.xmax)
            && self.ymin < self.ymax
            && self.xmin < self.xmax
    }

    /// Pixel rectangle `(x, y, width, height)` for a frame of the given size.
    ///
    /// Edges round outward so a region never loses a partially covered
    /// pixel. Returns `None` for invalid regions or ones that map to nothing.
    pub fn to_pixels(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        if !self.is_valid() || width == 0 || height == 0 {
            return None;
        }
        let scale = REGION_SCALE as f64;
        let x0 = (self.xmin as f64 / scale * width as f64).floor() as u32;
        let y0 = (self.ymin as f64 / scale * height as f64).floor() as u32;
        let x1 = ((self.xmax as f64 / scale * width as f64).ceil() as u32).min(width);
        let y1 = ((self.ymax as f64 / scale * height as f64).ceil() as u32).min(height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0, y0, x1 - x0, y1 - y0))
    }
}

/// Serde helper storing raw bytes as a base64 string.
pub(crate) mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── AdjustmentSet ────────────────────────────────────────────────

    #[test]
    fn default_is_neutral() {
        let adj = AdjustmentSet::default();
        assert!(adj.is_tone_neutral());
        assert_eq!(adj.warmth, 0.0);
        assert!(adj.watermark.is_empty());
        assert!(adj.overlay.is_none());
        assert!(!adj.privacy_blur);
    }

    #[test]
    fn with_methods_leave_original_untouched() {
        let base = AdjustmentSet::default();
        let edited = base.with_contrast(150.0).with_privacy_blur(true);
        assert_eq!(base.contrast, 100.0);
        assert!(!base.privacy_blur);
        assert_eq!(edited.contrast, 150.0);
        assert!(edited.privacy_blur);
    }

    #[test]
    fn clamped_limits_ranges() {
        let adj = AdjustmentSet {
            brightness: 500.0,
            contrast: -20.0,
            blur: 99.0,
            sepia: f32::NAN,
            warmth: 250.0,
            ..AdjustmentSet::default()
        }
        .clamped();
        assert_eq!(adj.brightness, 200.0);
        assert_eq!(adj.contrast, 0.0);
        assert_eq!(adj.blur, 20.0);
        assert_eq!(adj.sepia, 0.0);
        assert_eq!(adj.warmth, 100.0);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let adj: AdjustmentSet = serde_json::from_str(r#"{"brightness": 130}"#).unwrap();
        assert_eq!(adj.brightness, 130.0);
        assert_eq!(adj.contrast, 100.0);
        assert!(adj.overlay.is_none());
    }

    #[test]
    fn overlay_json_uses_base64_and_defaults() {
        let json = r#"{"bytes": "AQID"}"#;
        let overlay: Overlay = serde_json::from_str(json).unwrap();
        assert_eq!(overlay.bytes, vec![1, 2, 3]);
        assert_eq!(overlay.scale, DEFAULT_OVERLAY_SCALE);
        assert_eq!(overlay.opacity, DEFAULT_OVERLAY_OPACITY);
        assert_eq!(overlay.x, DEFAULT_OVERLAY_CENTER);

        let out = serde_json::to_string(&overlay).unwrap();
        assert!(out.contains("\"AQID\""));
    }

    // ── DetectionRegion ──────────────────────────────────────────────

    #[test]
    fn region_validity() {
        assert!(DetectionRegion::new(0, 0, 1000, 1000).is_valid());
        assert!(!DetectionRegion::new(500, 0, 400, 1000).is_valid());
        assert!(!DetectionRegion::new(0, 0, 0, 1000).is_valid());
        assert!(!DetectionRegion::new(-1, 0, 10, 10).is_valid());
        assert!(!DetectionRegion::new(0, 0, 10, 1001).is_valid());
    }

    #[test]
    fn region_maps_against_current_dimensions() {
        let region = DetectionRegion::new(250, 500, 750, 1000);
        assert_eq!(region.to_pixels(200, 100), Some((100, 25, 100, 50)));
        assert_eq!(region.to_pixels(2000, 1000), Some((1000, 250, 1000, 500)));
    }

    #[test]
    fn region_rounds_outward() {
        let region = DetectionRegion::new(0, 0, 1, 1);
        assert_eq!(region.to_pixels(10, 10), Some((0, 0, 1, 1)));
    }

    #[test]
    fn invalid_region_maps_to_none() {
        assert_eq!(DetectionRegion::new(10, 10, 5, 20).to_pixels(100, 100), None);
        assert_eq!(DetectionRegion::new(0, 0, 10, 10).to_pixels(0, 100), None);
    }
}
