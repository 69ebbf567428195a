use crate::models::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of the outbound chat-completions request.
#[derive(Serialize, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    pub stream: bool,
}

#[derive(Deserialize)]
pub struct StreamChunk {
    pub choices: Option<Vec<Choice>>,
}

#[derive(Deserialize)]
pub struct Choice {
    pub delta: Option<Delta>,
}

#[derive(Deserialize)]
pub struct Delta {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCallFragment>>,
}

#[derive(Deserialize)]
pub struct ToolCallFragment {
    #[serde(default)]
    pub index: u32,
    pub id: Option<String>,
    pub function: Option<FunctionFragment>,
}

#[derive(Deserialize)]
pub struct FunctionFragment {
    pub name: Option<String>,
    pub arguments: Option<String>,
}
