use crate::{BoxStream, Error, ErrorContext, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use keyring::Entry;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Proxy, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::env;
use std::time::Duration;

/// Keyring service under which API keys are looked up.
const KEYRING_SERVICE: &str = "ai-client-rust";

/// Client construction knobs, all env-overridable.
///
/// `timeout` bounds a whole JSON round trip including its body. It is unset by default
/// and never applied to streamed responses, which legitimately run for minutes.
/// `connect_timeout` bounds establishing every connection.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Option<Duration>,
    pub connect_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    pub proxy_url: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            connect_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
            proxy_url: None,
        }
    }
}

impl TransportConfig {
    /// Minimal production-friendly defaults (env-overridable).
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let timeout_secs = env::var("AI_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .or_else(|| env::var("AI_TIMEOUT_SECS").ok().and_then(|s| s.parse::<u64>().ok()));
        Self {
            timeout: timeout_secs.map(Duration::from_secs).or(defaults.timeout),
            connect_timeout: env::var("AI_HTTP_CONNECT_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            pool_max_idle_per_host: env::var("AI_HTTP_POOL_MAX_IDLE_PER_HOST")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(defaults.pool_max_idle_per_host),
            pool_idle_timeout: env::var("AI_HTTP_POOL_IDLE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.pool_idle_timeout),
            proxy_url: env::var("AI_PROXY_URL").ok(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// JSON-over-HTTP client bound to one base URL.
///
/// Every non-success status is turned into [`Error::Remote`] after the body has been read,
/// so callers see `"[status] statusText - body"` regardless of the vendor.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Option<Duration>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_config(base_url, &TransportConfig::from_env(), HeaderMap::new())
    }

    pub fn with_config(
        base_url: impl Into<String>,
        config: &TransportConfig,
        extra_headers: HeaderMap,
    ) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;

        let mut headers = extra_headers;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Some(config.pool_idle_timeout))
            // Conservative HTTP/2 keepalive defaults for long-lived connections.
            .http2_adaptive_window(true)
            .http2_keep_alive_interval(Some(Duration::from_secs(30)))
            .http2_keep_alive_timeout(Duration::from_secs(10));

        if let Some(proxy_url) = &config.proxy_url {
            if let Ok(proxy) = Proxy::all(proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;

        Ok(Self {
            client,
            base_url,
            timeout: config.timeout,
        })
    }

    /// Wrap an already configured `reqwest::Client`.
    pub fn from_client(client: reqwest::Client, base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url.into())?,
            timeout: None,
        })
    }

    /// Build a header map holding a single secret header (e.g. `api-key`).
    pub fn secret_header(name: &'static str, value: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let mut value = HeaderValue::from_str(value).map_err(|e| {
            Error::configuration_with_context(
                format!("Invalid header value: {}", e),
                ErrorContext::new().with_field_path(name),
            )
        })?;
        value.set_sensitive(true);
        headers.insert(HeaderName::from_static(name), value);
        Ok(headers)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(self.bounded(self.client.get(self.url(path)))).await?;
        read_json(response).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .send(self.bounded(self.client.post(self.url(path)).json(body)))
            .await?;
        read_json(response).await
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .send(self.bounded(self.client.put(self.url(path)).json(body)))
            .await?;
        read_json(response).await
    }

    /// POST whose response body is irrelevant (e.g. `/api/copy`).
    pub async fn post_empty<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        self.send(self.bounded(self.client.post(self.url(path)).json(body)))
            .await
            .map(|_| ())
    }

    /// DELETE with a JSON body (e.g. Ollama `/api/delete`).
    pub async fn delete_with_body<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        self.send(self.bounded(self.client.delete(self.url(path)).json(body)))
            .await
            .map(|_| ())
    }

    /// POST and expose the raw response body as a byte stream.
    pub async fn post_stream<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<BoxStream<'static, Bytes>> {
        let response = self
            .send(
                self.client
                    .post(self.url(path))
                    .header(ACCEPT, "application/x-ndjson")
                    .json(body),
            )
            .await?;

        // Convert reqwest bytes stream to our unified BoxStream
        let byte_stream = response
            .bytes_stream()
            .map_err(|e| Error::Transport(TransportError::Http(e)));
        Ok(Box::pin(byte_stream))
    }

    /// Applies the configured total timeout. Streaming requests skip this.
    fn bounded(&self, request: RequestBuilder) -> RequestBuilder {
        match self.timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::Transport(TransportError::Http(e)))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let status_text = status.canonical_reason().unwrap_or_default().to_string();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("[{}] {} - {}", status.as_u16(), status_text, body);
            return Err(Error::remote(status.as_u16(), status_text, body));
        }
        Ok(response)
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let body = response
        .bytes()
        .await
        .map_err(|e| Error::Transport(TransportError::Http(e)))?;
    Ok(serde_json::from_slice(&body)?)
}

fn normalize_base_url(base_url: String) -> Result<String> {
    url::Url::parse(&base_url).map_err(|e| {
        Error::configuration_with_context(
            format!("Invalid base URL '{}': {}", base_url, e),
            ErrorContext::new().with_field_path("base_url"),
        )
    })?;
    Ok(base_url.trim_end_matches('/').to_string())
}

/// Resolve an API key: OS keyring first, then the given environment variable.
pub fn lookup_api_key(keyring_user: &str, env_var: &str) -> Option<String> {
    // 1. Try Keyring
    if let Ok(entry) = Entry::new(KEYRING_SERVICE, keyring_user) {
        if let Ok(key) = entry.get_password() {
            return Some(key);
        }
    }

    // 2. Try Environment Variable
    env::var(env_var).ok().filter(|v| !v.is_empty())
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Other(String),
}
