use super::{error_result, ToolExecutor};
use async_trait::async_trait;
use jsonschema::{Draft, JSONSchema};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

pub const OPEN_URL: &str = "openUrl";
pub const CLOSE_CURRENT_TAB: &str = "closeCurrentTab";
pub const GOOGLE_SEARCH: &str = "googleSearch";

/// The fixed browser capability set, parsed from a tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum BrowserTool {
    OpenUrl { url: String },
    CloseCurrentTab,
    GoogleSearch { query: String },
    Unknown(String),
}

impl BrowserTool {
    /// Validates `arguments` against the tool's schema before building the variant.
    pub fn from_call(name: &str, arguments: &Value) -> Result<Self, String> {
        let str_arg = |key: &str| {
            arguments
                .get(key)
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .ok_or_else(|| format!("Missing required argument: {}", key))
        };

        match name {
            OPEN_URL => {
                validate_arguments(name, arguments)?;
                Ok(BrowserTool::OpenUrl { url: str_arg("url")? })
            }
            CLOSE_CURRENT_TAB => {
                validate_arguments(name, arguments)?;
                Ok(BrowserTool::CloseCurrentTab)
            }
            GOOGLE_SEARCH => {
                validate_arguments(name, arguments)?;
                Ok(BrowserTool::GoogleSearch {
                    query: str_arg("query")?,
                })
            }
            other => Ok(BrowserTool::Unknown(other.to_string())),
        }
    }
}

fn input_schema(name: &str) -> Option<Value> {
    match name {
        OPEN_URL => Some(json!({
            "type": "object",
            "properties": { "url": { "type": "string" } },
            "required": ["url"]
        })),
        CLOSE_CURRENT_TAB => Some(json!({
            "type": "object",
            "properties": {},
            "required": []
        })),
        GOOGLE_SEARCH => Some(json!({
            "type": "object",
            "properties": { "query": { "type": "string" } },
            "required": ["query"]
        })),
        _ => None,
    }
}

/// The three function definitions sent with every chat request.
pub fn tool_definitions() -> Vec<Value> {
    [
        (
            OPEN_URL,
            "Open a URL in a new tab. Use it when the user wants to go to a website.",
        ),
        (CLOSE_CURRENT_TAB, "Close the currently active tab."),
        (
            GOOGLE_SEARCH,
            "Search Google for information by opening a search tab.",
        ),
    ]
    .into_iter()
    .filter_map(|(name, description)| {
        input_schema(name).map(|parameters| {
            json!({
                "type": "function",
                "function": {
                    "name": name,
                    "description": description,
                    "parameters": parameters,
                }
            })
        })
    })
    .collect()
}

pub fn validate_arguments(tool_name: &str, arguments: &Value) -> Result<(), String> {
    let schema = input_schema(tool_name).ok_or_else(|| format!("Tool '{}' not found", tool_name))?;

    let compiled = JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(&schema)
        .map_err(|e| format!("Invalid tool schema: {}", e))?;

    if let Err(errors) = compiled.validate(arguments) {
        let error_messages: Vec<String> = errors
            .map(|e| format!("{}: {}", e.instance_path, e))
            .collect();
        return Err(error_messages.join("; "));
    }

    Ok(())
}

/// Anything not starting with `http` gets an `https://` scheme.
pub fn normalize_url(url: &str) -> String {
    if url.starts_with("http") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

pub fn search_url(query: &str) -> String {
    format!(
        "https://www.google.com/search?q={}",
        urlencoding::encode(query)
    )
}

/// Side effects behind the browser tools.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn open_tab(&self, url: &str) -> Result<(), String>;

    /// Close the tab the given session lives in.
    async fn close_tab(&self, session_id: &str) -> Result<(), String>;
}

pub struct BrowserActions<B> {
    browser: Arc<B>,
}

impl<B: Browser> BrowserActions<B> {
    pub fn new(browser: Arc<B>) -> Self {
        Self { browser }
    }

    pub fn browser(&self) -> &Arc<B> {
        &self.browser
    }
}

#[async_trait]
impl<B: Browser + 'static> ToolExecutor for BrowserActions<B> {
    fn definitions(&self) -> Vec<Value> {
        tool_definitions()
    }

    async fn execute(&self, session_id: &str, name: &str, arguments: &Value) -> Value {
        let tool = match BrowserTool::from_call(name, arguments) {
            Ok(tool) => tool,
            Err(e) => {
                warn!(tool = name, error = %e, "rejected tool arguments");
                return error_result(e);
            }
        };
        debug!(?tool, session_id, "executing browser action");

        match tool {
            BrowserTool::OpenUrl { url } => {
                let url = normalize_url(&url);
                match self.browser.open_tab(&url).await {
                    Ok(()) => json!({ "status": "opened", "url": url }),
                    Err(e) => error_result(e),
                }
            }
            BrowserTool::CloseCurrentTab => match self.browser.close_tab(session_id).await {
                Ok(()) => json!({ "status": "closed" }),
                Err(e) => error_result(e),
            },
            BrowserTool::GoogleSearch { query } => {
                match self.browser.open_tab(&search_url(&query)).await {
                    Ok(()) => json!({ "status": "searching", "query": query }),
                    Err(e) => error_result(e),
                }
            }
            BrowserTool::Unknown(_) => error_result("Function not found"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBrowser {
        opened: Mutex<Vec<String>>,
        closed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Browser for RecordingBrowser {
        async fn open_tab(&self, url: &str) -> Result<(), String> {
            self.opened.lock().unwrap().push(url.to_string());
            Ok(())
        }

        async fn close_tab(&self, session_id: &str) -> Result<(), String> {
            self.closed.lock().unwrap().push(session_id.to_string());
            Ok(())
        }
    }

    struct BrokenBrowser;

    #[async_trait]
    impl Browser for BrokenBrowser {
        async fn open_tab(&self, _url: &str) -> Result<(), String> {
            Err("no display".to_string())
        }

        async fn close_tab(&self, _session_id: &str) -> Result<(), String> {
            Err("no display".to_string())
        }
    }

    #[test]
    fn exactly_three_definitions() {
        let defs = tool_definitions();
        let names: Vec<&str> = defs
            .iter()
            .filter_map(|d| d["function"]["name"].as_str())
            .collect();
        assert_eq!(names, vec![OPEN_URL, CLOSE_CURRENT_TAB, GOOGLE_SEARCH]);
        assert!(defs.iter().all(|d| d["type"] == "function"));
    }

    #[test]
    fn from_call_maps_names_to_variants() {
        assert_eq!(
            BrowserTool::from_call("googleSearch", &json!({"query": "rust"})).unwrap(),
            BrowserTool::GoogleSearch { query: "rust".into() }
        );
        assert_eq!(
            BrowserTool::from_call("closeCurrentTab", &json!({})).unwrap(),
            BrowserTool::CloseCurrentTab
        );
        assert_eq!(
            BrowserTool::from_call("formatDisk", &json!({})).unwrap(),
            BrowserTool::Unknown("formatDisk".into())
        );
    }

    #[test]
    fn schema_violation_is_rejected() {
        let err = BrowserTool::from_call("openUrl", &json!({"url": 42})).unwrap_err();
        assert!(err.contains("url"));
    }

    #[test]
    fn url_normalization() {
        assert_eq!(normalize_url("example.com"), "https://example.com");
        assert_eq!(normalize_url("http://example.com"), "http://example.com");
    }

    #[test]
    fn search_query_is_encoded() {
        assert_eq!(
            search_url("flights Japan & more"),
            "https://www.google.com/search?q=flights%20Japan%20%26%20more"
        );
    }

    #[tokio::test]
    async fn search_opens_tab_and_reports_query() {
        let browser = Arc::new(RecordingBrowser::default());
        let actions = BrowserActions::new(browser.clone());

        let result = actions
            .execute("tab-1", GOOGLE_SEARCH, &json!({"query": "flights Japan"}))
            .await;

        assert_eq!(result, json!({"status": "searching", "query": "flights Japan"}));
        assert_eq!(
            browser.opened.lock().unwrap().as_slice(),
            ["https://www.google.com/search?q=flights%20Japan"]
        );
    }

    #[tokio::test]
    async fn close_targets_the_calling_session() {
        let browser = Arc::new(RecordingBrowser::default());
        let actions = BrowserActions::new(browser.clone());

        let result = actions.execute("tab-9", CLOSE_CURRENT_TAB, &json!({})).await;

        assert_eq!(result, json!({"status": "closed"}));
        assert_eq!(browser.closed.lock().unwrap().as_slice(), ["tab-9"]);
    }

    #[tokio::test]
    async fn unknown_tool_returns_fixed_error() {
        let actions = BrowserActions::new(Arc::new(RecordingBrowser::default()));
        let result = actions.execute("tab-1", "launchRocket", &json!({})).await;
        assert_eq!(result, json!({"error": "Function not found"}));
    }

    #[tokio::test]
    async fn invalid_json_substitute_yields_error_result() {
        let actions = BrowserActions::new(Arc::new(RecordingBrowser::default()));
        let result = actions
            .execute("tab-1", OPEN_URL, &json!({"error": "Invalid JSON args"}))
            .await;
        assert!(result["error"].as_str().unwrap().contains("url"));
    }

    #[tokio::test]
    async fn browser_failure_becomes_error_result() {
        let actions = BrowserActions::new(Arc::new(BrokenBrowser));
        let result = actions.execute("tab-1", OPEN_URL, &json!({"url": "x.org"})).await;
        assert_eq!(result, json!({"error": "no display"}));
    }
}
