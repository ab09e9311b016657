//! Ollama REST API, embedding model and model manager against a mock server

use crate::mock_server::MockServerFixture;
use ai_client_rust::model::EmbeddingModel;
use ai_client_rust::ollama::dto::{ChatRequest, EmbedRequest, Message, Role};
use ai_client_rust::ollama::merge::merge;
use ai_client_rust::ollama::{ModelManagementOptions, OllamaApi, OllamaModelManager, PullModelStrategy};
use ai_client_rust::transport::TransportConfig;
use ai_client_rust::Error;
use futures::StreamExt;
use mockito::Matcher;
use serde_json::json;
use std::io::Write;
use std::time::Duration;

fn chat_request() -> ChatRequest {
    ChatRequest::new("llama3.2", vec![Message::new(Role::User, "Say hello")])
}

#[tokio::test]
async fn test_chat_round_trip() {
    let fixture = MockServerFixture::new().await;
    let mock = fixture
        .mock_json(
            "POST",
            "/api/chat",
            Some(Matcher::PartialJson(json!({"model": "llama3.2", "stream": false}))),
            200,
            json!({
                "model": "llama3.2",
                "created_at": "2025-10-18T12:00:00Z",
                "message": {"role": "assistant", "content": "Hello!"},
                "done": true,
                "done_reason": "stop",
                "total_duration": 2_000_000_000u64,
                "prompt_eval_count": 12,
                "eval_count": 3
            }),
        )
        .await;

    let response = fixture.ollama_api().chat(&chat_request()).await.unwrap();
    assert_eq!(response.message.as_ref().unwrap().content, "Hello!");
    assert_eq!(response.done_reason.as_deref(), Some("stop"));
    assert_eq!(response.total_duration(), Some(Duration::from_secs(2)));
    assert_eq!(response.prompt_eval_count, Some(12));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_stream_chat_chunks_fold_into_one_response() {
    let fixture = MockServerFixture::new().await;
    let _mock = fixture
        .mock_ndjson(
            "/api/chat",
            Some(Matcher::PartialJson(json!({"stream": true}))),
            vec![
                json!({"model": "llama3.2", "message": {"role": "assistant", "content": "Hel"}, "done": false}),
                json!({"model": "llama3.2", "message": {"role": "assistant", "content": "lo"}, "done": false}),
                json!({"model": "llama3.2", "message": {"role": "assistant", "content": ""}, "done": true,
                       "done_reason": "stop", "prompt_eval_count": 5, "eval_count": 2}),
            ],
            1,
        )
        .await;

    let chunks: Vec<_> = fixture
        .ollama_api()
        .stream_chat(&chat_request().streaming(true))
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(chunks.len(), 3);

    let folded = chunks
        .into_iter()
        .map(Result::unwrap)
        .reduce(merge)
        .unwrap();
    assert_eq!(folded.message.unwrap().content, "Hello");
    assert_eq!(folded.done, Some(true));
    assert_eq!(folded.eval_count, Some(2));
}

#[tokio::test]
async fn test_vendor_error_becomes_remote_error() {
    let fixture = MockServerFixture::new().await;
    let _mock = fixture
        .mock_error("POST", "/api/chat", 404, r#"{"error":"model 'llama3.2' not found"}"#)
        .await;

    let err = fixture.ollama_api().chat(&chat_request()).await.unwrap_err();
    assert!(matches!(err, Error::Remote { status: 404, .. }));
    assert_eq!(
        err.to_string(),
        r#"[404] Not Found - {"error":"model 'llama3.2' not found"}"#
    );
}

#[tokio::test]
async fn test_embed_and_embedding_model() {
    let fixture = MockServerFixture::new().await;
    let _mock = fixture
        .mock_json(
            "POST",
            "/api/embed",
            Some(Matcher::PartialJson(json!({"model": "nomic-embed-text"}))),
            200,
            json!({
                "model": "nomic-embed-text",
                "embeddings": [[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]],
                "prompt_eval_count": 8
            }),
        )
        .await;

    let raw = fixture
        .ollama_api()
        .embed(&EmbedRequest::new("nomic-embed-text", vec!["a".into(), "b".into()]))
        .await
        .unwrap();
    assert_eq!(raw.embeddings.len(), 2);

    let model = fixture.embedding_model("nomic-embed-text");
    let response = model
        .embed_all(vec!["a".to_string(), "b".to_string()])
        .await
        .unwrap();
    assert_eq!(response[1], vec![0.4, 0.5, 0.6]);
    assert_eq!(model.dimensions().await.unwrap(), 3);
}

#[tokio::test]
async fn test_list_models_and_availability() {
    let fixture = MockServerFixture::new().await;
    let _mock = fixture
        .mock_json(
            "GET",
            "/api/tags",
            None,
            200,
            json!({"models": [{
                "name": "llama3.2:latest",
                "model": "llama3.2:latest",
                "modified_at": "2025-10-01T10:00:00Z",
                "size": 2019393189u64,
                "digest": "a80c4f17acd5",
                "details": {"format": "gguf", "family": "llama", "parameter_size": "3.2B"}
            }]}),
        )
        .await;

    let models = fixture.ollama_api().list_models().await.unwrap();
    assert_eq!(models.models[0].details.family.as_deref(), Some("llama"));

    let manager = OllamaModelManager::new(fixture.ollama_api(), ModelManagementOptions::default());
    assert!(manager.is_model_available("llama3.2").await.unwrap());
    assert!(manager.is_model_available("llama3.2:latest").await.unwrap());
    assert!(!manager.is_model_available("mistral").await.unwrap());
}

#[tokio::test]
async fn test_when_missing_skips_pull_of_present_model() {
    let fixture = MockServerFixture::new().await;
    let _tags = fixture
        .mock_json(
            "GET",
            "/api/tags",
            None,
            200,
            json!({"models": [{"name": "llama3.2:latest", "model": "llama3.2:latest", "size": 1, "digest": "x", "details": {}}]}),
        )
        .await;
    let pull = fixture
        .mock_ndjson("/api/pull", None, vec![json!({"status": "success"})], 0)
        .await;

    let manager = OllamaModelManager::new(fixture.ollama_api(), ModelManagementOptions::default());
    manager
        .pull_model("llama3.2", PullModelStrategy::WhenMissing)
        .await
        .unwrap();
    pull.assert_async().await;
}

#[tokio::test]
async fn test_pull_follows_progress_until_success() {
    let fixture = MockServerFixture::new().await;
    let _tags = fixture
        .mock_json(
            "GET",
            "/api/tags",
            None,
            200,
            json!({"models": [{"name": "qwen2.5:0.5b", "model": "qwen2.5:0.5b", "size": 1, "digest": "x", "details": {}}]}),
        )
        .await;
    let pull = fixture
        .mock_ndjson(
            "/api/pull",
            Some(Matcher::PartialJson(json!({"model": "qwen2.5:0.5b", "stream": true}))),
            vec![
                json!({"status": "pulling manifest"}),
                json!({"status": "downloading", "digest": "sha256:1", "total": 100, "completed": 50}),
                json!({"status": "verifying sha256 digest"}),
                json!({"status": "success"}),
            ],
            1,
        )
        .await;

    let manager = OllamaModelManager::new(
        fixture.ollama_api(),
        ModelManagementOptions::default().with_timeout(Duration::from_secs(10)),
    );
    manager
        .pull_model("qwen2.5:0.5b", PullModelStrategy::Always)
        .await
        .unwrap();
    pull.assert_async().await;
}

#[tokio::test]
async fn test_pull_without_success_is_retried_then_fails() {
    let fixture = MockServerFixture::new().await;
    let pull = fixture
        .mock_ndjson("/api/pull", None, vec![json!({"status": "pulling manifest"})], 2)
        .await;

    let manager = OllamaModelManager::new(
        fixture.ollama_api(),
        ModelManagementOptions::default()
            .with_max_retries(1)
            .with_retry_delay(Duration::from_millis(10)),
    );
    let err = manager
        .pull_model("missing", PullModelStrategy::Always)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("ended without success"));
    pull.assert_async().await;
}

/// Writes one NDJSON line, pauses, then writes the rest.
fn slow_body(
    first: &'static str,
    pause: Duration,
    rest: &'static str,
) -> impl Fn(&mut dyn Write) -> std::io::Result<()> + Send + Sync + 'static {
    move |w: &mut dyn Write| {
        w.write_all(first.as_bytes())?;
        w.flush()?;
        std::thread::sleep(pause);
        w.write_all(rest.as_bytes())
    }
}

#[tokio::test]
async fn test_request_timeout_does_not_cut_slow_pull_stream() {
    let fixture = MockServerFixture::new().await;
    let _tags = fixture
        .mock_json(
            "GET",
            "/api/tags",
            None,
            200,
            json!({"models": [{"name": "big:latest", "model": "big:latest", "size": 1, "digest": "x", "details": {}}]}),
        )
        .await;
    let _pull = {
        let mut server = fixture.server.lock().await;
        server
            .mock("POST", "/api/pull")
            .with_status(200)
            .with_header("content-type", "application/x-ndjson")
            .with_chunked_body(slow_body(
                "{\"status\":\"pulling manifest\"}\n",
                Duration::from_millis(1500),
                "{\"status\":\"success\"}\n",
            ))
            .create_async()
            .await
    };

    // The total timeout is shorter than the pause inside the stream.
    let api = OllamaApi::with_config(
        &fixture.base_url,
        &TransportConfig::default().with_timeout(Duration::from_millis(500)),
    )
    .unwrap();
    let manager = OllamaModelManager::new(api, ModelManagementOptions::default());
    manager
        .pull_model("big", PullModelStrategy::Always)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_request_timeout_bounds_plain_json_calls() {
    let fixture = MockServerFixture::new().await;
    let _chat = {
        let mut server = fixture.server.lock().await;
        server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_chunked_body(slow_body(
                "{\"model\":\"llama3.2\",",
                Duration::from_millis(1500),
                "\"done\":true}",
            ))
            .create_async()
            .await
    };

    let api = OllamaApi::with_config(
        &fixture.base_url,
        &TransportConfig::default().with_timeout(Duration::from_millis(500)),
    )
    .unwrap();
    let err = api.chat(&chat_request()).await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
}
