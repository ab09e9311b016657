use super::dto::{
    ChatRequest, ChatResponse, CopyModelRequest, DeleteModelRequest, EmbedRequest, EmbedResponse,
    EmbeddingsRequest, EmbeddingsResponse, GenerateRequest, GenerateResponse,
    ListModelResponse, ListRunningModelsResponse, ProgressResponse, PullModelRequest,
    ShowModelRequest, ShowModelResponse,
};
use crate::transport::{decode_ndjson, HttpTransport, TransportConfig};
use crate::{BoxStream, Error, ErrorContext, Result};
use reqwest::header::HeaderMap;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

fn require_stream(stream: bool, expected: bool, endpoint: &str) -> Result<()> {
    if stream == expected {
        return Ok(());
    }
    let message = if expected {
        "Request must set the stream property to true."
    } else {
        "Stream mode must be disabled."
    };
    Err(Error::validation_with_context(
        message,
        ErrorContext::new()
            .with_field_path("stream")
            .with_source(endpoint.to_string()),
    ))
}

fn require_model(model: &str) -> Result<()> {
    Error::require_text(model, "model")
}

/// Low-level client of the Ollama REST API.
///
/// Each request type carries its own `stream` flag; the blocking and streaming variants
/// check it before any network call.
#[derive(Clone)]
pub struct OllamaApi {
    transport: HttpTransport,
}

impl OllamaApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_config(base_url, &TransportConfig::from_env())
    }

    pub fn with_config(base_url: impl Into<String>, config: &TransportConfig) -> Result<Self> {
        Ok(Self {
            transport: HttpTransport::with_config(base_url, config, HeaderMap::new())?,
        })
    }

    pub fn from_transport(transport: HttpTransport) -> Self {
        Self { transport }
    }

    pub fn base_url(&self) -> &str {
        self.transport.base_url()
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        require_model(&request.model)?;
        require_stream(request.stream, false, "/api/chat")?;
        tracing::debug!(model = %request.model, messages = request.messages.len(), "ollama chat");
        self.transport.post_json("/api/chat", request).await
    }

    /// One element per NDJSON line; the last carries `done: true` and the counters.
    pub async fn stream_chat(&self, request: &ChatRequest) -> Result<BoxStream<'static, ChatResponse>> {
        require_model(&request.model)?;
        require_stream(request.stream, true, "/api/chat")?;
        tracing::debug!(model = %request.model, "ollama streaming chat");
        let bytes = self.transport.post_stream("/api/chat", request).await?;
        Ok(decode_ndjson(bytes))
    }

    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        require_model(&request.model)?;
        require_stream(request.stream, false, "/api/generate")?;
        self.transport.post_json("/api/generate", request).await
    }

    pub async fn stream_generate(
        &self,
        request: &GenerateRequest,
    ) -> Result<BoxStream<'static, GenerateResponse>> {
        require_model(&request.model)?;
        require_stream(request.stream, true, "/api/generate")?;
        let bytes = self.transport.post_stream("/api/generate", request).await?;
        Ok(decode_ndjson(bytes))
    }

    pub async fn embed(&self, request: &EmbedRequest) -> Result<EmbedResponse> {
        require_model(&request.model)?;
        if request.input.is_empty() {
            return Err(Error::validation_with_context(
                "Input cannot be empty",
                ErrorContext::new().with_field_path("input"),
            ));
        }
        self.transport.post_json("/api/embed", request).await
    }

    /// Single-prompt endpoint superseded by [`embed`](Self::embed).
    pub async fn embeddings(&self, request: &EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        require_model(&request.model)?;
        self.transport.post_json("/api/embeddings", request).await
    }

    pub async fn list_models(&self) -> Result<ListModelResponse> {
        self.transport.get_json("/api/tags").await
    }

    pub async fn show_model(&self, request: &ShowModelRequest) -> Result<ShowModelResponse> {
        require_model(&request.model)?;
        self.transport.post_json("/api/show", request).await
    }

    pub async fn copy_model(&self, request: &CopyModelRequest) -> Result<()> {
        Error::require_text(&request.source, "source")?;
        Error::require_text(&request.destination, "destination")?;
        self.transport.post_empty("/api/copy", request).await
    }

    pub async fn delete_model(&self, request: &DeleteModelRequest) -> Result<()> {
        require_model(&request.model)?;
        self.transport.delete_with_body("/api/delete", request).await
    }

    /// Progress of a pull, one element per status line.
    pub async fn pull_model(
        &self,
        request: &PullModelRequest,
    ) -> Result<BoxStream<'static, ProgressResponse>> {
        require_model(&request.model)?;
        require_stream(request.stream, true, "/api/pull")?;
        let bytes = self.transport.post_stream("/api/pull", request).await?;
        Ok(decode_ndjson(bytes))
    }

    pub async fn list_running_models(&self) -> Result<ListRunningModelsResponse> {
        self.transport.get_json("/api/ps").await
    }
}
