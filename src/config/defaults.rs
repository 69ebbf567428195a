pub const DEFAULT_API_ENDPOINT: &str = "https://api.deepseek.com/chat/completions";

pub const EXAMPLE_CONFIG: &str = r#"# tabchat configuration
api:
  # key: ${DEEPSEEK_API_KEY}
  endpoint: https://api.deepseek.com
  # stream_timeout: 60

model:
  default_model: deepseek-chat
  # system_prompt: "You are a helpful browser assistant."

engine:
  max_loops: 4
  max_history_chars: 30000

session:
  verbose: false
  # history_dir: ~/.cache/tabchat

# vision:
#   openai_key: ${OPENAI_API_KEY}
#   google_key: ${GOOGLE_API_KEY}

# browser:
#   opener: xdg-open
"#;

/// Append `/chat/completions` to a base URL unless it is already there.
pub fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.ends_with("/chat/completions") {
        endpoint.to_string()
    } else if endpoint.ends_with('/') {
        format!("{}chat/completions", endpoint)
    } else {
        format!("{}/chat/completions", endpoint)
    }
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
