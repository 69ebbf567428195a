use super::browser::Browser;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

const OPENER_TIMEOUT_SECS: u64 = 10;

/// Opens tabs through the desktop's URL opener. There is no tab to close from
/// a terminal, so a close request is recorded for the caller to act on.
pub struct SystemBrowser {
    opener: String,
    opener_timeout: Duration,
    close_requested: AtomicBool,
}

impl SystemBrowser {
    pub fn new(opener: impl Into<String>) -> Self {
        Self {
            opener: opener.into(),
            opener_timeout: Duration::from_secs(OPENER_TIMEOUT_SECS),
            close_requested: AtomicBool::new(false),
        }
    }

    pub fn with_opener_timeout(mut self, limit: Duration) -> Self {
        self.opener_timeout = limit;
        self
    }

    pub fn default_opener() -> &'static str {
        if cfg!(target_os = "macos") {
            "open"
        } else if cfg!(target_os = "windows") {
            "explorer"
        } else {
            "xdg-open"
        }
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested.load(Ordering::SeqCst)
    }
}

impl Default for SystemBrowser {
    fn default() -> Self {
        Self::new(Self::default_opener())
    }
}

#[async_trait]
impl Browser for SystemBrowser {
    async fn open_tab(&self, url: &str) -> Result<(), String> {
        debug!(opener = %self.opener, url, "opening url");
        let child = Command::new(&self.opener)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("Failed to launch '{}': {}", self.opener, e))?;

        let output = timeout(self.opener_timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                format!(
                    "'{}' did not finish within {} ms",
                    self.opener,
                    self.opener_timeout.as_millis()
                )
            })?
            .map_err(|e| format!("Failed to wait for '{}': {}", self.opener, e))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(format!(
                "'{}' exited with {}: {}",
                self.opener,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ))
        }
    }

    async fn close_tab(&self, session_id: &str) -> Result<(), String> {
        debug!(session_id, "close requested");
        self.close_requested.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn close_is_recorded() {
        let browser = SystemBrowser::new("true");
        assert!(!browser.close_requested());
        browser.close_tab("tab-1").await.unwrap();
        assert!(browser.close_requested());
    }

    #[tokio::test]
    async fn missing_opener_is_an_error() {
        let browser = SystemBrowser::new("/nonexistent/tabchat-opener");
        let err = browser.open_tab("https://example.com").await.unwrap_err();
        assert!(err.contains("Failed to launch"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_opener_reports_exit_code() {
        let browser = SystemBrowser::new("false");
        let err = browser.open_tab("https://example.com").await.unwrap_err();
        assert!(err.contains("exited with 1"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_opener_is_killed_after_timeout() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("finished");
        let script = dir.path().join("slow-opener");
        std::fs::write(
            &script,
            format!("#!/bin/sh\nsleep 1\ntouch '{}'\n", marker.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let browser = SystemBrowser::new(script.display().to_string())
            .with_opener_timeout(Duration::from_millis(100));
        let err = browser.open_tab("https://example.com").await.unwrap_err();
        assert!(err.contains("did not finish"));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }
}
