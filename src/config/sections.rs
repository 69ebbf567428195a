use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub max_loops: Option<usize>,
    #[serde(default)]
    pub max_history_chars: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub verbose: Option<bool>,
    #[serde(default)]
    pub history_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VisionConfig {
    #[serde(default)]
    pub openai_key: Option<String>,
    #[serde(default)]
    pub google_key: Option<String>,
    #[serde(default)]
    pub openai_endpoint: Option<String>,
    #[serde(default)]
    pub gemini_base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BrowserConfig {
    #[serde(default)]
    pub opener: Option<String>,
}
