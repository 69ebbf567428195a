mod filesystem;
mod storage;

pub use filesystem::FilesystemStorage;
pub use storage::{MemoryStorage, SessionStorage};

use crate::error::Result;
use crate::models::Message;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Roughly 8k tokens of conversation.
pub const DEFAULT_MAX_HISTORY_CHARS: usize = 30_000;

pub const KEY_PREFIX: &str = "chat_";

pub fn history_key(session_id: &str) -> String {
    format!("{}{}", KEY_PREFIX, session_id)
}

/// Keep the longest recent suffix whose total size stays strictly below
/// `max_chars`. Messages are never cut; the walk stops at the first message
/// that does not fit. A leading `tool` message may lose the assistant turn
/// that requested it.
pub fn trim_history(messages: Vec<Message>, max_chars: usize) -> Vec<Message> {
    let mut total = 0usize;
    let mut keep = 0usize;

    for msg in messages.iter().rev() {
        let len = msg.char_len();
        if total + len < max_chars {
            total += len;
            keep += 1;
        } else {
            break;
        }
    }

    let skip = messages.len() - keep;
    messages.into_iter().skip(skip).collect()
}

/// Per-session conversation log on top of a [`SessionStorage`] backend.
#[derive(Clone)]
pub struct HistoryStore {
    storage: Arc<dyn SessionStorage>,
    max_chars: usize,
}

impl HistoryStore {
    pub fn new(storage: Arc<dyn SessionStorage>, max_chars: usize) -> Self {
        Self { storage, max_chars }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()), DEFAULT_MAX_HISTORY_CHARS)
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Stored messages for a session, dropping entries that are not valid messages.
    pub fn load(&self, session_id: &str) -> Result<Vec<Message>> {
        let Some(stored) = self.storage.get(&history_key(session_id))? else {
            return Ok(Vec::new());
        };

        let Value::Array(entries) = stored else {
            warn!(session_id, "stored history is not a list; starting fresh");
            return Ok(Vec::new());
        };

        let total = entries.len();
        let messages: Vec<Message> = entries
            .into_iter()
            .filter(is_valid_entry)
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect();

        if messages.len() < total {
            warn!(
                session_id,
                dropped = total - messages.len(),
                "filtered invalid history entries"
            );
        }
        Ok(messages)
    }

    pub fn save(&self, session_id: &str, messages: &[Message]) -> Result<()> {
        let value = serde_json::to_value(messages)?;
        self.storage.set(&history_key(session_id), value)
    }

    /// Record a single-shot exchange (e.g. an image analysis) and re-trim.
    pub fn append_and_save(&self, session_id: &str, user_text: &str, assistant_text: &str) -> Result<()> {
        let mut messages = self.load(session_id)?;
        messages.push(Message::user(user_text));
        messages.push(Message::assistant(assistant_text));
        let messages = trim_history(messages, self.max_chars);
        self.save(session_id, &messages)
    }

    pub fn remove(&self, session_id: &str) -> Result<()> {
        self.storage.remove(&history_key(session_id))
    }

    pub fn clear_all(&self) -> Result<()> {
        self.storage.clear()
    }
}

/// An entry needs a role plus text content, content parts, tool calls or a tool call id.
fn is_valid_entry(entry: &Value) -> bool {
    let has_role = entry
        .get("role")
        .and_then(|r| r.as_str())
        .map(|r| !r.is_empty())
        .unwrap_or(false);
    if !has_role {
        return false;
    }

    let content = entry.get("content");
    let content_ok = matches!(content, Some(Value::String(_)) | Some(Value::Array(_)));
    let has_tool_calls = entry
        .get("tool_calls")
        .map(|tc| !tc.is_null())
        .unwrap_or(false);
    let has_tool_call_id = entry
        .get("tool_call_id")
        .and_then(|id| id.as_str())
        .map(|id| !id.is_empty())
        .unwrap_or(false);

    content_ok || has_tool_calls || has_tool_call_id
}
