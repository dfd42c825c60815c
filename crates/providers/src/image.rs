//! Still-image generation through the Gemini `generateContent` API.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;

use crate::error::ProviderError;
use crate::http::{client_with_timeout, parse_json};

const PROVIDER: &str = "gemini";
const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-3-pro-image-preview";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageOptions {
    /// e.g. `9:16`; provider default when `None`.
    pub aspect_ratio: Option<String>,
    /// Appended to every prompt.
    pub style_prompt: Option<String>,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generate one image and return its encoded bytes.
    async fn generate(&self, prompt: &str, options: &ImageOptions)
        -> Result<Vec<u8>, ProviderError>;
}

/// Reference image sent next to every prompt so clips share one look.
///
/// Loaded once at startup and shared by every request.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleReference {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl StyleReference {
    pub async fn load(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(Self {
            bytes,
            mime_type: image_mime_type(path).to_string(),
        })
    }
}

fn image_mime_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// Prompt with the project's style addition appended.
pub fn styled_prompt(prompt: &str, options: &ImageOptions) -> String {
    match options.style_prompt.as_deref().map(str::trim) {
        Some(style) if !style.is_empty() => format!("{prompt}\n\nStyle: {style}"),
        _ => prompt.to_string(),
    }
}

/// `generateContent` body: the prompt, then the reference image when one
/// is loaded.
fn request_body(
    prompt: &str,
    options: &ImageOptions,
    reference: Option<&StyleReference>,
) -> serde_json::Value {
    let mut generation_config = serde_json::json!({ "responseModalities": ["IMAGE"] });
    if let Some(aspect) = &options.aspect_ratio {
        generation_config["imageConfig"] = serde_json::json!({ "aspectRatio": aspect });
    }

    let mut parts = vec![serde_json::json!({ "text": styled_prompt(prompt, options) })];
    if let Some(reference) = reference {
        parts.push(serde_json::json!({
            "inlineData": {
                "mimeType": reference.mime_type,
                "data": BASE64.encode(&reference.bytes),
            },
        }));
    }

    serde_json::json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": generation_config,
    })
}

// ---------------------------------------------------------------------------
// Response structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(rename = "inlineData")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

/// Decode the first inline image of the first candidate.
fn extract_image(response: GenerateResponse) -> Result<Vec<u8>, ProviderError> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::invalid(PROVIDER, "no candidates returned"))?;
    let finish_reason = candidate.finish_reason.unwrap_or_default();

    let inline = candidate
        .content
        .into_iter()
        .flat_map(|content| content.parts)
        .filter_map(|part| part.inline_data)
        .find(|data| data.mime_type.starts_with("image/"))
        .ok_or_else(|| {
            ProviderError::invalid(
                PROVIDER,
                format!("no image in response (finish reason: {finish_reason})"),
            )
        })?;

    BASE64
        .decode(inline.data.as_bytes())
        .map_err(|e| ProviderError::invalid(PROVIDER, format!("bad image payload: {e}")))
}

pub struct GeminiImage {
    client: reqwest::Client,
    api_key: String,
    model: String,
    style_reference: Option<Arc<StyleReference>>,
}

impl GeminiImage {
    pub fn new(api_key: String) -> Result<Self, ProviderError> {
        Ok(Self {
            client: client_with_timeout(REQUEST_TIMEOUT)?,
            api_key,
            model: DEFAULT_MODEL.to_string(),
            style_reference: None,
        })
    }

    pub fn with_style_reference(mut self, reference: Option<StyleReference>) -> Self {
        self.style_reference = reference.map(Arc::new);
        self
    }
}

#[async_trait]
impl ImageGenerator for GeminiImage {
    async fn generate(
        &self,
        prompt: &str,
        options: &ImageOptions,
    ) -> Result<Vec<u8>, ProviderError> {
        let body = request_body(prompt, options, self.style_reference.as_deref());

        let response = self
            .client
            .post(format!("{API_BASE}/{}:generateContent", self.model))
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .await?;

        let image = extract_image(parse_json(PROVIDER, response).await?)?;
        tracing::debug!(bytes = image.len(), "Image generated");
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn style_is_appended_when_present() {
        let plain = ImageOptions::default();
        assert_eq!(styled_prompt("a lighthouse", &plain), "a lighthouse");

        let styled = ImageOptions {
            style_prompt: Some(" watercolor ".into()),
            ..Default::default()
        };
        assert_eq!(
            styled_prompt("a lighthouse", &styled),
            "a lighthouse\n\nStyle: watercolor"
        );
    }

    #[test]
    fn reference_image_follows_the_prompt() {
        let options = ImageOptions {
            aspect_ratio: Some("9:16".into()),
            ..Default::default()
        };
        let reference = StyleReference {
            bytes: vec![0x89, 0x50, 0x4e, 0x47],
            mime_type: "image/png".into(),
        };

        let body = request_body("a lighthouse", &options, Some(&reference));
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "a lighthouse");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["inlineData"]["data"], "iVBORw==");
        assert_eq!(body["generationConfig"]["imageConfig"]["aspectRatio"], "9:16");
    }

    #[test]
    fn prompt_is_sent_alone_without_reference() {
        let body = request_body("a lighthouse", &ImageOptions::default(), None);
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 1);
        assert!(body["generationConfig"].get("imageConfig").is_none());
    }

    #[tokio::test]
    async fn reference_is_loaded_with_its_mime_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Sample.PNG");
        tokio::fs::write(&path, b"png-bytes").await.unwrap();

        let reference = StyleReference::load(&path).await.unwrap();
        assert_eq!(reference.bytes, b"png-bytes");
        assert_eq!(reference.mime_type, "image/png");

        assert_eq!(image_mime_type(Path::new("style/sample.jpeg")), "image/jpeg");
        assert!(StyleReference::load(&dir.path().join("missing.png")).await.is_err());
    }

    #[test]
    fn inline_image_is_decoded() {
        let response: GenerateResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "here you go" },
                    { "inlineData": { "mimeType": "image/png", "data": "iVBORw==" } }
                ]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();

        assert_eq!(extract_image(response).unwrap(), vec![0x89, 0x50, 0x4e, 0x47]);
    }

    #[test]
    fn text_only_response_is_rejected() {
        let response: GenerateResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "I can't draw that" }] },
                "finishReason": "SAFETY"
            }]
        }))
        .unwrap();

        assert_matches!(
            extract_image(response),
            Err(ProviderError::InvalidResponse { message, .. }) if message.contains("SAFETY")
        );
    }
}
