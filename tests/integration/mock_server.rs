//! Mock HTTP server setup for integration tests

use ai_client_rust::ollama::{OllamaApi, OllamaChatModel, OllamaEmbeddingModel, OllamaOptions};
use ai_client_rust::vectorstore::QdrantRestClient;
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Test fixture that manages a mock server
pub struct MockServerFixture {
    pub server: Arc<Mutex<ServerGuard>>,
    pub base_url: String,
}

impl MockServerFixture {
    pub async fn new() -> Self {
        let server = Server::new_async().await;
        let base_url = server.url();
        Self {
            server: Arc::new(Mutex::new(server)),
            base_url,
        }
    }

    pub fn ollama_api(&self) -> OllamaApi {
        OllamaApi::new(&self.base_url).expect("mock url is valid")
    }

    pub fn chat_model(&self, options: OllamaOptions) -> OllamaChatModel {
        OllamaChatModel::builder()
            .api(self.ollama_api())
            .default_options(options)
            .build()
            .expect("chat model")
    }

    pub fn embedding_model(&self, model: &str) -> OllamaEmbeddingModel {
        OllamaEmbeddingModel::builder()
            .api(self.ollama_api())
            .default_options(OllamaOptions::builder().model(model).build())
            .build()
            .expect("embedding model")
    }

    pub fn qdrant_client(&self) -> QdrantRestClient {
        QdrantRestClient::new(&self.base_url, Some("test-key".into())).expect("qdrant client")
    }

    /// A JSON response for `method path`, optionally only for bodies containing `body`.
    pub async fn mock_json(
        &self,
        method: &str,
        path: impl Into<Matcher>,
        body: Option<Matcher>,
        status: usize,
        response: Value,
    ) -> Mock {
        let mut server = self.server.lock().await;
        let mut mock = server
            .mock(method, path)
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(response.to_string());
        if let Some(body) = body {
            mock = mock.match_body(body);
        }
        mock.create_async().await
    }

    /// A newline-delimited JSON response, one line per element of `lines`, expected `hits` times.
    pub async fn mock_ndjson(
        &self,
        path: &str,
        body: Option<Matcher>,
        lines: Vec<Value>,
        hits: usize,
    ) -> Mock {
        let mut server = self.server.lock().await;
        let payload = lines
            .iter()
            .map(|line| format!("{}\n", line))
            .collect::<String>();
        let mut mock = server
            .mock("POST", path)
            .with_status(200)
            .with_header("content-type", "application/x-ndjson")
            .with_body(payload)
            .expect(hits);
        if let Some(body) = body {
            mock = mock.match_body(body);
        }
        mock.create_async().await
    }

    /// An error response with a plain text body.
    pub async fn mock_error(&self, method: &str, path: &str, status: usize, body: &str) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock(method, path)
            .with_status(status)
            .with_body(body)
            .create_async()
            .await
    }
}
