use super::tool::ToolCall;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Message content: plain text, or an array of content parts (e.g. text + image).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<Value>),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    /// Serialized as `null` when absent; assistant turns carrying only tool calls rely on it.
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self::text(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(Role::Assistant, text)
    }

    /// Assistant turn that requested tools. Empty text is sent as `null`.
    pub fn assistant_tool_calls(text: &str, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: if text.is_empty() {
                None
            } else {
                Some(Content::Text(text.to_string()))
            },
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(Content::Text(content.into())),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(Content::Text(text.into())),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn text_content(&self) -> Option<&str> {
        match &self.content {
            Some(Content::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// Size used by the history budget: content length (non-text content is
    /// measured as JSON, with a missing one counting as `""`) plus the JSON
    /// length of any tool calls.
    pub fn char_len(&self) -> usize {
        let content_len = match &self.content {
            Some(Content::Text(text)) => text.chars().count(),
            Some(Content::Parts(parts)) => serde_json::to_string(parts)
                .map(|s| s.chars().count())
                .unwrap_or(0),
            None => 2,
        };
        let tool_len = self
            .tool_calls
            .as_ref()
            .and_then(|calls| serde_json::to_string(calls).ok())
            .map(|s| s.chars().count())
            .unwrap_or(0);
        content_len + tool_len
    }
}
