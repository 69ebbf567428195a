use std::fmt;

#[derive(Debug)]
pub enum EngineError {
    /// Missing or unusable configuration, raised before any network call.
    ConfigError(String),
    ApiError {
        status: u16,
        message: String,
    },
    NetworkError(reqwest::Error),
    /// The connection dropped while a streamed round was being read.
    StreamInterrupted(String),
    Timeout,
    ToolError(String),
    HistoryError(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
    YamlError(serde_yaml::Error),
    Other(String),
}

impl EngineError {
    /// Errors that come from talking to the provider.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            EngineError::ApiError { .. }
                | EngineError::NetworkError(_)
                | EngineError::StreamInterrupted(_)
                | EngineError::Timeout
        )
    }

    /// Short message suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self {
            EngineError::ConfigError(msg) => msg.clone(),
            EngineError::ApiError { status, message } => {
                if message.trim().is_empty() {
                    format!("Provider request failed (status {})", status)
                } else {
                    message.clone()
                }
            }
            EngineError::NetworkError(_) => "Could not connect to the model provider.".to_string(),
            EngineError::StreamInterrupted(_) => {
                "The connection was lost while the answer was streaming.".to_string()
            }
            EngineError::Timeout => "The model provider stopped responding.".to_string(),
            EngineError::ToolError(msg) => format!("Tool failed: {}", msg),
            EngineError::HistoryError(_) => "Conversation history could not be stored.".to_string(),
            EngineError::IoError(e) => format!("I/O failure: {}", e),
            EngineError::JsonError(_) | EngineError::YamlError(_) => {
                "Received data could not be parsed.".to_string()
            }
            EngineError::Other(msg) => msg.clone(),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            EngineError::ApiError { status, message } => {
                write!(f, "API error (status {}): {}", status, message)
            }
            EngineError::NetworkError(e) => write!(f, "Network error: {}", e),
            EngineError::StreamInterrupted(msg) => write!(f, "Stream interrupted: {}", msg),
            EngineError::Timeout => write!(f, "Request timeout"),
            EngineError::ToolError(msg) => write!(f, "Tool error: {}", msg),
            EngineError::HistoryError(msg) => write!(f, "History error: {}", msg),
            EngineError::IoError(e) => write!(f, "IO error: {}", e),
            EngineError::JsonError(e) => write!(f, "JSON error: {}", e),
            EngineError::YamlError(e) => write!(f, "YAML error: {}", e),
            EngineError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::NetworkError(e) => Some(e),
            EngineError::IoError(e) => Some(e),
            EngineError::JsonError(e) => Some(e),
            EngineError::YamlError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EngineError::Timeout
        } else {
            EngineError::NetworkError(err)
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::IoError(err)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::JsonError(err)
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        EngineError::YamlError(err)
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Other(err.to_string())
    }
}

impl From<String> for EngineError {
    fn from(msg: String) -> Self {
        EngineError::Other(msg)
    }
}

impl From<&str> for EngineError {
    fn from(msg: &str) -> Self {
        EngineError::Other(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
