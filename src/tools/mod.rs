mod browser;
mod system;

pub use browser::{
    normalize_url, search_url, tool_definitions, validate_arguments, Browser, BrowserActions,
    BrowserTool, CLOSE_CURRENT_TAB, GOOGLE_SEARCH, OPEN_URL,
};
pub use system::SystemBrowser;

use async_trait::async_trait;
use serde_json::{json, Value};

/// Capability executed on behalf of the model.
///
/// Failures are reported inside the returned value as `{"error": ...}` and are
/// fed back to the model like any other result; they never abort a round.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Function schemas advertised to the provider.
    fn definitions(&self) -> Vec<Value>;

    async fn execute(&self, session_id: &str, name: &str, arguments: &Value) -> Value;
}

pub fn error_result(message: impl Into<String>) -> Value {
    json!({ "error": message.into() })
}
