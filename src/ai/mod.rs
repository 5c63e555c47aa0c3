//! Remote vision backends.
//!
//! [`VisionClient`] is the only boundary to the remote model. Implementations
//! shape requests and parse responses; retry, throttling, and cooldown live in
//! [`resilience`](crate::resilience) and [`scheduler`](crate::scheduler).

mod gemini;
mod openai;

pub use gemini::GeminiService;
pub use openai::OpenAiService;

use serde::{Deserialize, Serialize};

use crate::error::AiError;
use crate::model::{AdjustmentSet, DetectionRegion, REGION_SCALE};

/// Tone values suggested by the model. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnhanceSuggestion {
    pub brightness: Option<f32>,
    pub contrast: Option<f32>,
    pub saturation: Option<f32>,
    pub warmth: Option<f32>,
}

impl EnhanceSuggestion {
    pub fn is_empty(&self) -> bool {
        self.brightness.is_none()
            && self.contrast.is_none()
            && self.saturation.is_none()
            && self.warmth.is_none()
    }

    /// New adjustment set with the suggested tone values.
    ///
    /// Missing fields fall back to the neutral value, not to `base`; every
    /// other field of `base` is carried over.
    pub fn apply_to(&self, base: &AdjustmentSet) -> AdjustmentSet {
        let neutral = AdjustmentSet::default();
        AdjustmentSet {
            brightness: self.brightness.unwrap_or(neutral.brightness),
            contrast: self.contrast.unwrap_or(neutral.contrast),
            saturation: self.saturation.unwrap_or(neutral.saturation),
            warmth: self.warmth.unwrap_or(neutral.warmth),
            ..base.clone()
        }
        .clamped()
    }
}

/// A remote vision model.
///
/// Implement this trait to add a backend. The library ships with
/// [`GeminiService`] and [`OpenAiService`].
///
/// All three operations take the raw bytes of one still image. Errors are
/// reported as [`AiError`] so quota exhaustion can be told apart from other
/// failures.
#[async_trait::async_trait]
pub trait VisionClient: Send + Sync {
    /// The display name of this backend (e.g., "Gemini").
    fn name(&self) -> &str;

    /// Ask for brightness/contrast/saturation/warmth values.
    async fn suggest_enhancement(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> Result<EnhanceSuggestion, AiError>;

    /// Return the image with its background made transparent, PNG-encoded.
    async fn remove_background(&self, image: &[u8], mime_type: &str) -> Result<Vec<u8>, AiError>;

    /// Find faces and license plates. An empty list is a valid answer.
    async fn detect_privacy_regions(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> Result<Vec<DetectionRegion>, AiError>;
}

/// Prompt asking for tone suggestions as JSON.
pub fn enhance_prompt() -> String {
    r#"Analyze this photo and suggest global tone adjustments that would improve it. Return a JSON object:

{
  "brightness": 100,
  "contrast": 100,
  "saturation": 100,
  "warmth": 0
}

Rules:
- "brightness", "contrast", "saturation": percentages from 50 to 150, where 100 means unchanged.
- "warmth": 0 to 100, where 0 means no warm tint.
- Only suggest changes that clearly improve the photo.

Return ONLY the JSON object, no markdown formatting, no code blocks, no extra text."#
        .to_string()
}

/// Prompt asking for privacy-sensitive bounding boxes.
pub fn privacy_prompt() -> String {
    r#"Detect every human face and every vehicle license plate in this image. Return a JSON array:

[{"box_2d": [ymin, xmin, ymax, xmax], "label": "face"}]

Rules:
- Coordinates are integers normalized to 0-1000 relative to the image height (y) and width (x).
- "label" is "face" or "license_plate".
- If nothing is found, return an empty array [].

Return ONLY the JSON array, no markdown formatting, no code blocks, no extra text."#
        .to_string()
}

/// Prompt asking for a background-free cut-out.
pub fn background_prompt() -> String {
    "Remove the background from this image. Keep the main subject exactly as it is and make \
     everything else fully transparent. Return only the edited image as a PNG with an alpha channel."
        .to_string()
}

/// Parse raw model text into an [`EnhanceSuggestion`].
///
/// Handles code fences, trailing commas, surrounding prose, and numbers
/// sent as strings. Text that holds no usable field is
/// [`AiError::MalformedResponse`].
pub fn parse_enhancement(text: &str) -> Result<EnhanceSuggestion, AiError> {
    log::debug!("Raw enhancement response:\n{text}");

    for candidate in extract_json_candidates(text.trim(), '{', '}') {
        let value = match parse_lenient(&candidate) {
            Some(v) => v,
            None => continue,
        };
        if let Some(suggestion) = value_to_suggestion(&value) {
            return Ok(suggestion);
        }
    }

    Err(AiError::MalformedResponse(
        "no enhancement values in response".to_string(),
    ))
}

/// Parse raw model text into detection regions.
///
/// Accepts `[{"box_2d": [...]}]`, bare `[[...]]`, or `{"regions": [...]}`.
/// Boxes are clamped to 0–1000; degenerate boxes are dropped.
pub fn parse_regions(text: &str) -> Result<Vec<DetectionRegion>, AiError> {
    log::debug!("Raw detection response:\n{text}");

    let trimmed = text.trim();
    let mut candidates = extract_json_candidates(trimmed, '[', ']');
    candidates.extend(extract_json_candidates(trimmed, '{', '}'));

    let mut unreadable = None;
    for candidate in &candidates {
        let Some(value) = parse_lenient(candidate) else {
            continue;
        };
        let items = match &value {
            serde_json::Value::Array(items) => items,
            serde_json::Value::Object(obj) => {
                match obj.get("regions").or_else(|| obj.get("boxes")) {
                    Some(serde_json::Value::Array(items)) => items,
                    _ => continue,
                }
            }
            _ => continue,
        };
        match regions_from_items(items) {
            Ok(regions) => return Ok(regions),
            Err(e) => unreadable = Some(e),
        }
    }

    Err(unreadable.unwrap_or_else(|| {
        AiError::MalformedResponse("no region list in response".to_string())
    }))
}

/// Read every item of a region list.
///
/// Degenerate boxes are dropped. A non-empty list in which no item is a box
/// at all is malformed, not an empty answer.
fn regions_from_items(items: &[serde_json::Value]) -> Result<Vec<DetectionRegion>, AiError> {
    let mut regions = Vec::new();
    let mut unreadable = 0;
    for item in items {
        match box_bounds(item) {
            Some(bounds) => regions.extend(bounds_to_region(bounds)),
            None => unreadable += 1,
        }
    }
    if !items.is_empty() && unreadable == items.len() {
        return Err(AiError::MalformedResponse(format!(
            "none of {} region item(s) holds a box",
            items.len()
        )));
    }
    if unreadable > 0 {
        log::warn!("Ignoring {unreadable} unreadable region item(s)");
    }
    Ok(regions)
}

/// Build an [`AiError`] from a non-success HTTP response body.
///
/// Both supported backends wrap failures in `{"error": {...}}`; the numeric
/// code and the status/type strings are kept so a
/// [`QuotaClassifier`](crate::resilience::QuotaClassifier) can see them.
pub(crate) fn remote_error(status: u16, body: &str) -> AiError {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));

    let code = error.and_then(|e| e.get("code")).and_then(|c| c.as_i64());
    let message = match error {
        Some(e) => {
            let mut parts = Vec::new();
            for key in ["status", "type", "code"] {
                if let Some(s) = e.get(key).and_then(|v| v.as_str()) {
                    parts.push(s.to_string());
                }
            }
            if let Some(m) = e.get("message").and_then(|v| v.as_str()) {
                parts.push(m.to_string());
            }
            parts.join(": ")
        }
        None => body.trim().to_string(),
    };

    AiError::Remote {
        status: Some(status),
        code,
        message,
    }
}

/// Read a response, turning HTTP failures into classified [`AiError`]s.
pub(crate) async fn read_json(resp: reqwest::Response) -> Result<serde_json::Value, AiError> {
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| AiError::transport(format!("failed to read response: {e}")))?;

    if !status.is_success() {
        return Err(remote_error(status.as_u16(), &text));
    }

    serde_json::from_str(&text)
        .map_err(|e| AiError::MalformedResponse(format!("response is not JSON: {e}")))
}

fn parse_lenient(candidate: &str) -> Option<serde_json::Value> {
    serde_json::from_str(candidate)
        .ok()
        .or_else(|| serde_json::from_str(&fix_trailing_commas(candidate)).ok())
}

/// Extract possible JSON strings delimited by `open`/`close` from model text.
fn extract_json_candidates(text: &str, open: char, close: char) -> Vec<String> {
    let mut candidates = Vec::new();

    // Strategy 1: Strip markdown code fences (```json ... ``` or ``` ... ```)
    if text.contains("```") {
        let stripped = text
            .lines()
            .skip_while(|l| !l.trim().starts_with("```"))
            .skip(1)
            .take_while(|l| !l.trim().starts_with("```"))
            .collect::<Vec<_>>()
            .join("\n");
        if stripped.trim_start().starts_with(open) {
            candidates.push(stripped);
        }
    }

    // Strategy 2: Outermost delimiters
    if let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) {
        if end > start {
            candidates.push(text[start..=end].to_string());
        }
    }

    // Strategy 3: The whole text as-is
    if text.starts_with(open) {
        candidates.push(text.to_string());
    }

    candidates
}

/// Fix trailing commas in JSON (e.g. {"a": 1,} or ["a",])
fn fix_trailing_commas(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut escape_next = false;

    while let Some(c) = chars.next() {
        if escape_next {
            result.push(c);
            escape_next = false;
            continue;
        }
        if c == '\\' && in_string {
            result.push(c);
            escape_next = true;
            continue;
        }
        if c == '"' {
            in_string = !in_string;
            result.push(c);
            continue;
        }
        if !in_string && c == ',' {
            let rest: String = chars.clone().collect();
            let trimmed = rest.trim_start();
            if trimmed.starts_with('}') || trimmed.starts_with(']') {
                continue;
            }
        }
        result.push(c);
    }
    result
}

/// A number, or a string holding one.
fn as_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    }
}

fn value_to_suggestion(value: &serde_json::Value) -> Option<EnhanceSuggestion> {
    let obj = value.as_object()?;
    let field = |key: &str| {
        obj.get(key)
            .and_then(as_number)
            .filter(|v| v.is_finite())
            .map(|v| v as f32)
    };
    let suggestion = EnhanceSuggestion {
        brightness: field("brightness"),
        contrast: field("contrast"),
        saturation: field("saturation"),
        warmth: field("warmth"),
    };
    if suggestion.is_empty() {
        None
    } else {
        Some(suggestion)
    }
}

/// The four clamped coordinates of a box item, or `None` if it has none.
fn box_bounds(value: &serde_json::Value) -> Option<[i32; 4]> {
    let coords = match value {
        serde_json::Value::Array(coords) => coords,
        serde_json::Value::Object(obj) => obj
            .get("box_2d")
            .or_else(|| obj.get("box"))
            .and_then(|v| v.as_array())?,
        _ => return None,
    };
    if coords.len() != 4 {
        return None;
    }

    let mut bounds = [0i32; 4];
    for (slot, v) in bounds.iter_mut().zip(coords) {
        *slot = (as_number(v)?.round() as i32).clamp(0, REGION_SCALE);
    }
    Some(bounds)
}

fn bounds_to_region(bounds: [i32; 4]) -> Option<DetectionRegion> {
    let region = DetectionRegion::new(bounds[0], bounds[1], bounds[2], bounds[3]);
    if !region.is_valid() {
        log::debug!("Dropping degenerate region {bounds:?}");
        return None;
    }
    Some(region)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── prompts ──────────────────────────────────────────────────────

    #[test]
    fn prompts_mention_expected_fields() {
        let enhance = enhance_prompt();
        for field in ["brightness", "contrast", "saturation", "warmth", "JSON"] {
            assert!(enhance.contains(field), "missing {field}");
        }
        let privacy = privacy_prompt();
        assert!(privacy.contains("box_2d"));
        assert!(privacy.contains("0-1000"));
        assert!(background_prompt().contains("transparent"));
    }

    // ── parse_enhancement ────────────────────────────────────────────

    #[test]
    fn parse_enhancement_valid_json() {
        let s = parse_enhancement(
            r#"{"brightness": 110, "contrast": 105.5, "saturation": 120, "warmth": 15}"#,
        )
        .unwrap();
        assert_eq!(s.brightness, Some(110.0));
        assert_eq!(s.contrast, Some(105.5));
        assert_eq!(s.saturation, Some(120.0));
        assert_eq!(s.warmth, Some(15.0));
    }

    #[test]
    fn parse_enhancement_partial_fields() {
        let s = parse_enhancement(r#"{"brightness": 90}"#).unwrap();
        assert_eq!(s.brightness, Some(90.0));
        assert!(s.contrast.is_none());
        assert!(s.warmth.is_none());
    }

    #[test]
    fn parse_enhancement_markdown_fence_and_trailing_comma() {
        let text = "Here you go:\n```json\n{\"contrast\": 115,}\n```";
        let s = parse_enhancement(text).unwrap();
        assert_eq!(s.contrast, Some(115.0));
    }

    #[test]
    fn parse_enhancement_numbers_as_strings() {
        let s = parse_enhancement(r#"{"brightness": "105%", "warmth": "20"}"#).unwrap();
        assert_eq!(s.brightness, Some(105.0));
        assert_eq!(s.warmth, Some(20.0));
    }

    #[test]
    fn parse_enhancement_rejects_garbage() {
        assert!(matches!(
            parse_enhancement("I cannot help with that"),
            Err(AiError::MalformedResponse(_))
        ));
        assert!(parse_enhancement("{}").is_err());
        assert!(parse_enhancement(r#"{"mood": "happy"}"#).is_err());
    }

    // ── EnhanceSuggestion::apply_to ──────────────────────────────────

    #[test]
    fn apply_fills_neutral_defaults_and_keeps_other_fields() {
        let base = AdjustmentSet::default()
            .with_contrast(150.0)
            .with_sepia(40.0)
            .with_watermark("wm");
        let s = EnhanceSuggestion {
            brightness: Some(120.0),
            ..Default::default()
        };
        let out = s.apply_to(&base);
        assert_eq!(out.brightness, 120.0);
        assert_eq!(out.contrast, 100.0);
        assert_eq!(out.sepia, 40.0);
        assert_eq!(out.watermark, "wm");
    }

    #[test]
    fn apply_clamps_out_of_range_values() {
        let s = EnhanceSuggestion {
            saturation: Some(900.0),
            warmth: Some(-5.0),
            ..Default::default()
        };
        let out = s.apply_to(&AdjustmentSet::default());
        assert_eq!(out.saturation, 200.0);
        assert_eq!(out.warmth, 0.0);
    }

    // ── parse_regions ────────────────────────────────────────────────

    #[test]
    fn parse_regions_box_2d_objects() {
        let text = r#"[{"box_2d": [100, 200, 300, 400], "label": "face"},
                       {"box_2d": [500, 500, 600, 700], "label": "license_plate"}]"#;
        let regions = parse_regions(text).unwrap();
        assert_eq!(
            regions,
            vec![
                DetectionRegion::new(100, 200, 300, 400),
                DetectionRegion::new(500, 500, 600, 700),
            ]
        );
    }

    #[test]
    fn parse_regions_empty_array_is_success() {
        assert_eq!(parse_regions("[]").unwrap(), Vec::new());
        assert_eq!(parse_regions("```json\n[]\n```").unwrap(), Vec::new());
    }

    #[test]
    fn parse_regions_unreadable_items_are_malformed() {
        let text = r#"[{"ymin": 100, "xmin": 100, "ymax": 300, "xmax": 300, "label": "face"}]"#;
        assert!(matches!(
            parse_regions(text),
            Err(AiError::MalformedResponse(_))
        ));
        assert!(parse_regions(r#"{"regions": [{"label": "face"}, "plate"]}"#).is_err());
    }

    #[test]
    fn parse_regions_only_degenerate_boxes_is_clean() {
        let text = r#"[{"box_2d": [300, 300, 300, 400]}, {"box_2d": [900, 0, 100, 50]}]"#;
        assert_eq!(parse_regions(text).unwrap(), Vec::new());
    }

    #[test]
    fn parse_regions_bare_arrays_and_wrapper_object() {
        let bare = parse_regions("[[0, 0, 10, 10]]").unwrap();
        assert_eq!(bare, vec![DetectionRegion::new(0, 0, 10, 10)]);

        let wrapped = parse_regions(r#"{"regions": [{"box_2d": [1, 2, 3, 4]}]}"#).unwrap();
        assert_eq!(wrapped, vec![DetectionRegion::new(1, 2, 3, 4)]);
    }

    #[test]
    fn parse_regions_clamps_and_drops_degenerate() {
        let text = r#"[{"box_2d": [-20, 0, 1200, 500]}, {"box_2d": [300, 300, 300, 400]}, {"box_2d": [1, 2]}]"#;
        let regions = parse_regions(text).unwrap();
        assert_eq!(regions, vec![DetectionRegion::new(0, 0, 1000, 500)]);
    }

    #[test]
    fn parse_regions_rejects_prose() {
        assert!(matches!(
            parse_regions("No faces here."),
            Err(AiError::MalformedResponse(_))
        ));
    }

    // ── remote_error ─────────────────────────────────────────────────

    #[test]
    fn remote_error_reads_gemini_shape() {
        let body = r#"{"error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}}"#;
        match remote_error(429, body) {
            AiError::Remote {
                status,
                code,
                message,
            } => {
                assert_eq!(status, Some(429));
                assert_eq!(code, Some(429));
                assert!(message.contains("RESOURCE_EXHAUSTED"));
                assert!(message.contains("Quota exceeded"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn remote_error_reads_openai_shape() {
        let body = r#"{"error": {"message": "You exceeded your current quota", "type": "insufficient_quota", "code": "insufficient_quota"}}"#;
        match remote_error(429, body) {
            AiError::Remote { code, message, .. } => {
                assert_eq!(code, None);
                assert!(message.contains("insufficient_quota"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn remote_error_keeps_plain_body() {
        match remote_error(502, "  Bad Gateway \n") {
            AiError::Remote { message, .. } => assert_eq!(message, "Bad Gateway"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    // ── fix_trailing_commas ──────────────────────────────────────────

    #[test]
    fn fix_trailing_commas_basic() {
        assert_eq!(fix_trailing_commas(r#"{"a": 1,}"#), r#"{"a": 1}"#);
        assert_eq!(fix_trailing_commas(r#"["a",]"#), r#"["a"]"#);
        let s = r#"{"a": "hello,}"}"#;
        assert_eq!(fix_trailing_commas(s), s);
    }
}
