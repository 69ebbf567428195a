use crate::error::{EngineError, Result};
use serde_json::Value;

/// Pull `error.message` (or a bare string `error`) out of a provider error body.
pub fn extract_api_error_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    let error = json.get("error")?;
    error
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| error.as_str())
        .map(|s| s.to_string())
}

/// Extract `choices[0].message.content` from a non-streaming chat-completions response
pub fn extract_content(response_json: &Value) -> Result<Option<String>> {
    let first_choice = response_json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| EngineError::Other("No choices in response".to_string()))?;

    let message = first_choice
        .get("message")
        .ok_or_else(|| EngineError::Other("No message in response".to_string()))?;

    Ok(message
        .get("content")
        .and_then(|c| c.as_str())
        .map(|s| s.to_string()))
}

/// Extract `candidates[0].content.parts[0].text` from a Gemini response
pub fn extract_gemini_text(response_json: &Value) -> Result<Option<String>> {
    let first_candidate = response_json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| EngineError::Other("No candidates in response".to_string()))?;

    Ok(first_candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .and_then(|p| p.first())
        .and_then(|p| p.get("text"))
        .and_then(|t| t.as_str())
        .map(|s| s.to_string()))
}
