use crate::api::response::{extract_api_error_message, extract_content, extract_gemini_text};
use crate::error::{EngineError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};
use tracing::debug;

pub const DEFAULT_OPENAI_VISION_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_OPENAI_VISION_MODEL: &str = "gpt-4o";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-3-pro-image-preview";
pub const DEFAULT_GEMINI_VIDEO_MODEL: &str = "gemini-3-pro-preview";
pub const DEFAULT_VISION_PROMPT: &str =
    "Analyze this screenshot in detail and explain what is shown, the important UI elements and any relevant content.";

pub const DEFAULT_VIDEO_PROMPT: &str = "Describe this video in detail.";

/// Video analysis only works through Gemini.
pub const VIDEO_KEY_MISSING_TEXT: &str =
    "To analyze videos, configure a Google Gemini API key.";

/// Returned instead of an analysis when no vision provider is configured.
pub const VISION_FALLBACK_TEXT: &str = "Screenshot captured.\n\n(Tip: to have it analyzed, configure an OpenAI or Google Gemini API key.)";

#[derive(Debug, Clone)]
pub struct VisionSettings {
    pub openai_key: Option<String>,
    pub google_key: Option<String>,
    pub openai_endpoint: String,
    pub openai_model: String,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub gemini_video_model: String,
}

impl Default for VisionSettings {
    fn default() -> Self {
        Self {
            openai_key: None,
            google_key: None,
            openai_endpoint: DEFAULT_OPENAI_VISION_ENDPOINT.to_string(),
            openai_model: DEFAULT_OPENAI_VISION_MODEL.to_string(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_video_model: DEFAULT_GEMINI_VIDEO_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisionProvider {
    OpenAi,
    Gemini,
    Unconfigured,
}

impl VisionSettings {
    /// OpenAI wins when both keys are present.
    pub fn provider(&self) -> VisionProvider {
        if has_key(&self.openai_key) {
            VisionProvider::OpenAi
        } else if has_key(&self.google_key) {
            VisionProvider::Gemini
        } else {
            VisionProvider::Unconfigured
        }
    }

    pub fn can_analyze_video(&self) -> bool {
        has_key(&self.google_key)
    }
}

fn has_key(key: &Option<String>) -> bool {
    key.as_deref().map(|k| !k.trim().is_empty()).unwrap_or(false)
}

/// Single-shot image analysis. Without any configured key the fixed fallback
/// text is returned rather than an error.
pub async fn analyze_image(
    settings: &VisionSettings,
    image: &[u8],
    mime_type: &str,
    prompt: &str,
) -> Result<String> {
    let encoded = encode_media(image);
    let client = reqwest::Client::new();

    match settings.provider() {
        VisionProvider::OpenAi => {
            let key = settings.openai_key.as_deref().unwrap_or_default();
            let payload = json!({
                "model": settings.openai_model,
                "messages": [{
                    "role": "user",
                    "content": [
                        { "type": "text", "text": prompt },
                        {
                            "type": "image_url",
                            "image_url": { "url": format!("data:{};base64,{}", mime_type, encoded) }
                        }
                    ]
                }],
                "max_tokens": 500
            });

            debug!(model = %settings.openai_model, "requesting OpenAI vision analysis");
            let response = client
                .post(&settings.openai_endpoint)
                .bearer_auth(key)
                .json(&payload)
                .send()
                .await?;
            let json = read_json(response, "OpenAI").await?;
            Ok(extract_content(&json)?.unwrap_or_default())
        }
        VisionProvider::Gemini => {
            let key = settings.google_key.as_deref().unwrap_or_default();
            let url = format!(
                "{}/models/{}:generateContent",
                settings.gemini_base_url.trim_end_matches('/'),
                settings.gemini_model
            );
            let payload = json!({
                "contents": [{
                    "parts": [
                        { "text": prompt },
                        { "inline_data": { "mime_type": mime_type, "data": encoded } }
                    ]
                }]
            });

            debug!(model = %settings.gemini_model, "requesting Gemini vision analysis");
            let response = client
                .post(url)
                .query(&[("key", key)])
                .json(&payload)
                .send()
                .await?;
            let json = read_json(response, "Gemini").await?;
            Ok(extract_gemini_text(&json)?.unwrap_or_default())
        }
        VisionProvider::Unconfigured => Ok(VISION_FALLBACK_TEXT.to_string()),
    }
}

/// Gemini video analysis. `video` is base64, optionally wrapped in a
/// `data:<mime>;base64,` URL whose prefix is dropped before sending.
pub async fn analyze_video(
    settings: &VisionSettings,
    video: &str,
    mime_type: &str,
    prompt: &str,
) -> Result<String> {
    if !settings.can_analyze_video() {
        return Err(EngineError::ConfigError(VIDEO_KEY_MISSING_TEXT.to_string()));
    }
    let key = settings.google_key.as_deref().unwrap_or_default();
    let url = format!(
        "{}/models/{}:generateContent",
        settings.gemini_base_url.trim_end_matches('/'),
        settings.gemini_video_model
    );
    let payload = json!({
        "contents": [{
            "parts": [
                { "text": prompt },
                { "inline_data": { "mime_type": mime_type, "data": strip_data_url(video) } }
            ]
        }]
    });

    debug!(model = %settings.gemini_video_model, mime_type, "requesting Gemini video analysis");
    let response = reqwest::Client::new()
        .post(url)
        .query(&[("key", key)])
        .json(&payload)
        .send()
        .await?;
    let json = read_json(response, "Gemini Video").await?;
    Ok(extract_gemini_text(&json)?.unwrap_or_default())
}

/// Base64 payload of a data URL, or the input unchanged.
pub fn strip_data_url(data: &str) -> &str {
    match data.split_once(',') {
        Some((_, payload)) => payload,
        None => data,
    }
}

/// Standard base64 of raw media bytes.
pub fn encode_media(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

async fn read_json(response: reqwest::Response, provider: &str) -> Result<Value> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        let detail = extract_api_error_message(&body)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        return Err(EngineError::ApiError {
            status: status.as_u16(),
            message: format!("{} error: {}", provider, detail),
        });
    }
    Ok(serde_json::from_str(&body)?)
}

/// Best-effort MIME type from a file extension.
pub fn mime_from_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "image/jpeg",
    }
}

pub fn video_mime_from_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "mpeg" | "mpg" => "video/mpeg",
        _ => "video/mp4",
    }
}
