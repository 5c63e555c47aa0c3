use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde_json::json;

use super::gemini::normalize_png;
use super::{
    EnhanceSuggestion, VisionClient, background_prompt, enhance_prompt, parse_enhancement,
    parse_regions, privacy_prompt, read_json,
};
use crate::error::AiError;
use crate::model::DetectionRegion;

pub struct OpenAiService {
    api_key: String,
    model: String,
    image_model: String,
    client: Client,
}

impl OpenAiService {
    pub fn new(api_key: String, model: String, image_model: String) -> Self {
        Self {
            api_key,
            model,
            image_model,
            client: Client::new(),
        }
    }

    async fn chat(&self, prompt: &str, image: &[u8], mime_type: &str) -> Result<String, AiError> {
        let image_base64 = STANDARD.encode(image);
        let body = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are an image analysis assistant. You MUST respond with a valid JSON object only. No markdown, no code blocks, no extra text."
                },
                {
                    "role": "user",
                    "content": [
                        {
                            "type": "text",
                            "text": prompt
                        },
                        {
                            "type": "image_url",
                            "image_url": {
                                "url": format!("data:{mime_type};base64,{image_base64}"),
                                "detail": "high"
                            }
                        }
                    ]
                }
            ],
            "max_tokens": 1000,
            "response_format": { "type": "json_object" }
        });

        let resp = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| AiError::transport(format!("OpenAI request failed: {e}")))?;

        let json = read_json(resp).await?;
        json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AiError::MalformedResponse("no content in OpenAI response".into()))
    }
}

/// File name matching the upload's MIME type; the images endpoint checks it.
fn upload_name(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "image.png",
        "image/webp" => "image.webp",
        _ => "image.jpg",
    }
}

#[async_trait::async_trait]
impl VisionClient for OpenAiService {
    fn name(&self) -> &str {
        "OpenAI"
    }

    async fn suggest_enhancement(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> Result<EnhanceSuggestion, AiError> {
        let content = self.chat(&enhance_prompt(), image, mime_type).await?;
        parse_enhancement(&content)
    }

    async fn remove_background(&self, image: &[u8], mime_type: &str) -> Result<Vec<u8>, AiError> {
        let part = Part::bytes(image.to_vec())
            .file_name(upload_name(mime_type))
            .mime_str(mime_type)
            .map_err(|e| AiError::Unavailable(format!("invalid MIME type {mime_type}: {e}")))?;

        let form = Form::new()
            .text("model", self.image_model.clone())
            .text("prompt", background_prompt())
            .text("background", "transparent")
            .text("output_format", "png")
            .part("image", part);

        let resp = self
            .client
            .post("https://api.openai.com/v1/images/edits")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| AiError::transport(format!("OpenAI request failed: {e}")))?;

        let json = read_json(resp).await?;
        let data = json["data"][0]["b64_json"]
            .as_str()
            .ok_or_else(|| AiError::MalformedResponse("no image in OpenAI response".into()))?;
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
        // json_object mode only allows objects, so the array goes under "regions"
        let prompt = format!(
            "{}\n\nWrap the array in an object: {{\"regions\": [...]}}",
            privacy_prompt()
        );
        let content = self.chat(&prompt, image, mime_type).await?;
        parse_regions(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_name_follows_mime() {
        assert_eq!(upload_name("image/png"), "image.png");
        assert_eq!(upload_name("image/webp"), "image.webp");
        assert_eq!(upload_name("image/jpeg"), "image.jpg");
    }

    #[test]
    fn service_name() {
        let service = OpenAiService::new("sk".into(), "gpt-4o-mini".into(), "gpt-image-1".into());
        assert_eq!(service.name(), "OpenAI");
    }
}
