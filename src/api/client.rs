use crate::api::models::ChatRequest;
use crate::api::response::extract_api_error_message;
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Opens a streamed chat-completions request.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Checked before any history is touched or any request is sent.
    fn ensure_ready(&self) -> Result<()> {
        Ok(())
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream>;
}

pub struct HttpProvider {
    api_key: Option<String>,
    api_endpoint: String,
    stream_timeout: Option<Duration>,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(api_key: Option<String>, api_endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            api_endpoint: api_endpoint.into(),
            stream_timeout: None,
            client,
        })
    }

    /// Fail a round when no bytes arrive for this long.
    pub fn with_stream_timeout(mut self, secs: Option<u64>) -> Self {
        self.stream_timeout = secs.map(Duration::from_secs);
        self
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            EngineError::ConfigError(
                "No API key configured. Set DEEPSEEK_API_KEY or api.key in the config file."
                    .to_string(),
            )
        })
    }

    fn headers(&self, api_key: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e| {
                EngineError::ConfigError(format!("Invalid authorization header: {}", e))
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait]
impl ChatProvider for HttpProvider {
    fn ensure_ready(&self) -> Result<()> {
        self.api_key().map(|_| ())
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
        let headers = self.headers(self.api_key()?)?;

        debug!(
            endpoint = %self.api_endpoint,
            messages = request.messages.len(),
            "opening chat stream"
        );
        let response = self
            .client
            .post(&self.api_endpoint)
            .headers(headers)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::ApiError {
                status,
                message: extract_api_error_message(&body).unwrap_or(body),
            });
        }

        let body = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| EngineError::StreamInterrupted(e.to_string()))
        });

        Ok(match self.stream_timeout {
            Some(idle) => with_idle_timeout(body.boxed(), idle),
            None => body.boxed(),
        })
    }
}

/// Ends the stream with `Timeout` when a single chunk takes longer than `idle`.
fn with_idle_timeout(inner: ByteStream, idle: Duration) -> ByteStream {
    stream::unfold(Some(inner), move |state| async move {
        let mut inner = state?;
        match timeout(idle, inner.next()).await {
            Ok(Some(item)) => Some((item, Some(inner))),
            Ok(None) => None,
            Err(_) => Some((Err(EngineError::Timeout), None)),
        }
    })
    .boxed()
}
