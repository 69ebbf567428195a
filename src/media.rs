use crate::api::vision::{
    analyze_image, analyze_video, VisionSettings, DEFAULT_VIDEO_PROMPT, VIDEO_KEY_MISSING_TEXT,
};
use crate::error::{EngineError, Result};
use crate::history::HistoryStore;
use tracing::debug;

/// Analyze an image and record the exchange in the session's history.
///
/// Without a vision key the fallback text is both returned and recorded.
pub async fn record_image_analysis(
    settings: &VisionSettings,
    history: &HistoryStore,
    session_id: &str,
    image: &[u8],
    mime_type: &str,
    prompt: &str,
    file_name: &str,
) -> Result<String> {
    let text = analyze_image(settings, image, mime_type, prompt).await?;
    let label = format!("{} [image: {}]", prompt, file_name);
    history.append_and_save(session_id, &label, &text)?;
    debug!(session_id, provider = ?settings.provider(), "image analysis recorded");
    Ok(text)
}

/// Analyze a base64 (or data-URL) video and record the exchange.
///
/// Without a Google key the notice is recorded against the prompt and the
/// call fails with it.
pub async fn record_video_analysis(
    settings: &VisionSettings,
    history: &HistoryStore,
    session_id: &str,
    video: &str,
    mime_type: &str,
    prompt: Option<&str>,
) -> Result<String> {
    let prompt = prompt
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(DEFAULT_VIDEO_PROMPT);

    if !settings.can_analyze_video() {
        history.append_and_save(session_id, prompt, VIDEO_KEY_MISSING_TEXT)?;
        return Err(EngineError::ConfigError(VIDEO_KEY_MISSING_TEXT.to_string()));
    }

    let text = analyze_video(settings, video, mime_type, prompt).await?;
    history.append_and_save(session_id, &format!("{} [Video attached]", prompt), &text)?;
    debug!(session_id, "video analysis recorded");
    Ok(text)
}
