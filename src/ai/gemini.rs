use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde_json::json;

use super::{
    EnhanceSuggestion, VisionClient, background_prompt, enhance_prompt, parse_enhancement,
    parse_regions, privacy_prompt, read_json,
};
use crate::error::AiError;
use crate::model::DetectionRegion;

pub struct GeminiService {
    api_key: String,
    model: String,
    image_model: String,
    client: Client,
}

impl GeminiService {
    pub fn new(api_key: String, model: String, image_model: String) -> Self {
        Self {
            api_key,
            model,
            image_model,
            client: Client::new(),
        }
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        image: &[u8],
        mime_type: &str,
        generation_config: serde_json::Value,
    ) -> Result<serde_json::Value, AiError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            model, self.api_key
        );

        let body = json!({
            "contents": [
                {
                    "parts": [
                        { "text": prompt },
                        {
                            "inline_data": {
                                "mime_type": mime_type,
                                "data": STANDARD.encode(image)
                            }
                        }
                    ]
                }
            ],
            "generationConfig": generation_config
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AiError::transport(format!("Gemini request failed: {e}")))?;

        read_json(resp).await
    }

    async fn generate_text(
        &self,
        prompt: &str,
        image: &[u8],
        mime_type: &str,
    ) -> Result<String, AiError> {
        let json = self
            .generate(
                &self.model,
                prompt,
                image,
                mime_type,
                json!({
                    "maxOutputTokens": 1000,
                    "responseMimeType": "application/json"
                }),
            )
            .await?;

        json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AiError::MalformedResponse("no content in Gemini response".into()))
    }
}

/// First inline image payload among the response parts.
fn inline_image(json: &serde_json::Value) -> Option<&str> {
    json["candidates"][0]["content"]["parts"]
        .as_array()?
        .iter()
        .find_map(|part| {
            part.get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(|d| d.get("data"))
                .and_then(|d| d.as_str())
        })
}

/// Decode whatever image the backend sent and re-encode it as RGBA PNG.
pub(crate) fn normalize_png(bytes: &[u8]) -> Result<Vec<u8>, AiError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| AiError::MalformedResponse(format!("returned image is unreadable: {e}")))?;
    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(img.to_rgba8())
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .map_err(|e| AiError::MalformedResponse(format!("failed to re-encode image: {e}")))?;
    Ok(out)
}

#[async_trait::async_trait]
impl VisionClient for GeminiService {
    fn name(&self) -> &str {
        "Gemini"
    }

    async fn suggest_enhancement(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> Result<EnhanceSuggestion, AiError> {
        let content = self.generate_text(&enhance_prompt(), image, mime_type).await?;
        parse_enhancement(&content)
    }

    async fn remove_background(&self, image: &[u8], mime_type: &str) -> Result<Vec<u8>, AiError> {
        let json = self
            .generate(
                &self.image_model,
                &background_prompt(),
                image,
                mime_type,
                json!({ "responseModalities": ["IMAGE"] }),
            )
            .await?;

        let data = inline_image(&json)
            .ok_or_else(|| AiError::MalformedResponse("no image in Gemini response".into()))?;
        let bytes = STANDARD
            .decode(data)
            .map_err(|e| AiError::MalformedResponse(format!("invalid image payload: {e}")))?;
        normalize_png(&bytes)
    }

    async fn detect_privacy_regions(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> Result<Vec<DetectionRegion>, AiError> {
        let content = self.generate_text(&privacy_prompt(), image, mime_type).await?;
        parse_regions(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_image_accepts_both_casings() {
        let camel = json!({"candidates": [{"content": {"parts": [
            {"text": "here"},
            {"inlineData": {"mimeType": "image/png", "data": "AAAA"}}
        ]}}]});
        assert_eq!(inline_image(&camel), Some("AAAA"));

        let snake = json!({"candidates": [{"content": {"parts": [
            {"inline_data": {"mime_type": "image/png", "data": "BBBB"}}
        ]}}]});
        assert_eq!(inline_image(&snake), Some("BBBB"));
    }

    #[test]
    fn inline_image_missing() {
        let text_only = json!({"candidates": [{"content": {"parts": [{"text": "sorry"}]}}]});
        assert_eq!(inline_image(&text_only), None);
        assert_eq!(inline_image(&json!({})), None);
    }

    #[test]
    fn normalize_png_produces_rgba_png() {
        let rgb = image::RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30]));
        let mut jpeg = Vec::new();
        image::DynamicImage::ImageRgb8(rgb)
            .write_to(&mut std::io::Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
            .unwrap();

        let png = normalize_png(&jpeg).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(image::guess_format(&png).unwrap(), image::ImageFormat::Png);
        assert!(decoded.color().has_alpha());
        assert_eq!((decoded.width(), decoded.height()), (3, 2));
    }

    #[test]
    fn normalize_png_rejects_garbage() {
        assert!(matches!(
            normalize_png(b"not an image"),
            Err(AiError::MalformedResponse(_))
        ));
    }
}
