use super::storage::SessionStorage;
use super::KEY_PREFIX;
use crate::error::Result;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One JSON file per session key inside a directory.
pub struct FilesystemStorage {
    dir: PathBuf,
}

impl FilesystemStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `~/.cache/tabchat`, falling back to the working directory.
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tabchat")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Percent-encoded so distinct keys never share a file and `/` cannot
    /// leave the directory.
    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", urlencoding::encode(key)))
    }
}

impl SessionStorage for FilesystemStorage {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        match serde_json::from_str(&content) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable history file");
                Ok(None)
            }
        }
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let content = serde_json::to_string_pretty(&value)?;
        fs::write(self.path_for(key), content)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Ok(());
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            let is_history = path.extension().and_then(|e| e.to_str()) == Some("json")
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(KEY_PREFIX))
                    .unwrap_or(false);
            if is_history {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}
