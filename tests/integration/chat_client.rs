//! Chat client over the Ollama chat model, including the internal tool loop

use crate::mock_server::MockServerFixture;
use ai_client_rust::advisor::{AdvisorHandle, SimpleLoggerAdvisor};
use ai_client_rust::ollama::OllamaOptions;
use ai_client_rust::tool::{FunctionToolCallback, ToolCallback};
use ai_client_rust::ChatClient;
use futures::StreamExt;
use mockito::Matcher;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Deserialize, JsonSchema)]
struct NoInput {}

#[derive(Deserialize, JsonSchema)]
struct CityInput {
    city: String,
}

/// Matches a request whose conversation is exactly one user message (`text` is a regex).
fn only_user_message(text: &str) -> Matcher {
    Matcher::Regex(format!(r#""messages":\[\{{"role":"user","content":"{}"\}}\]"#, text))
}

fn final_answer(text: &str) -> Value {
    json!({
        "model": "llama3.2",
        "message": {"role": "assistant", "content": text},
        "done": true,
        "done_reason": "stop",
        "prompt_eval_count": 20,
        "eval_count": 4
    })
}

fn tool_request(calls: Value) -> Value {
    json!({
        "model": "llama3.2",
        "message": {"role": "assistant", "content": "", "tool_calls": calls},
        "done": true,
        "done_reason": "stop",
        "prompt_eval_count": 10,
        "eval_count": 2
    })
}

#[tokio::test]
async fn test_call_with_system_and_user_text() {
    let fixture = MockServerFixture::new().await;
    let mock = fixture
        .mock_json(
            "POST",
            "/api/chat",
            Some(Matcher::PartialJson(json!({
                "model": "llama3.2",
                "messages": [
                    {"role": "system", "content": "Answer like a pirate"},
                    {"role": "user", "content": "Tell me about Rust"}
                ],
                "options": {"temperature": 0.3}
            }))),
            200,
            final_answer("Arr, Rust be safe."),
        )
        .await;

    let model = fixture.chat_model(OllamaOptions::builder().model("llama3.2").temperature(0.3).build());
    let client = ChatClient::builder(Arc::new(model))
        .default_system("Answer like a {style}")
        .default_advisor(AdvisorHandle::both(SimpleLoggerAdvisor::default()))
        .build();

    let response = client
        .prompt()
        .system_with(|s| s.param("style", "pirate"))
        .user("Tell me about Rust")
        .call()
        .chat_response()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.result().unwrap().text(), "Arr, Rust be safe.");
    assert_eq!(response.metadata.usage.total_tokens, 24);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_internal_tool_loop_sends_tool_results_back() {
    let fixture = MockServerFixture::new().await;
    // The follow-up request carries the tool response; the first one does not.
    let answer = fixture
        .mock_json(
            "POST",
            "/api/chat",
            Some(Matcher::Regex(r#""role":"tool","content":"sunny","tool_name":"weather""#.into())),
            200,
            final_answer("It is sunny in Paris."),
        )
        .await;
    let ask = fixture
        .mock_json(
            "POST",
            "/api/chat",
            Some(Matcher::AllOf(vec![
                only_user_message("What is the weather in Paris\\?"),
                Matcher::PartialJson(json!({"tools": [{"type": "function", "function": {"name": "weather"}}]})),
            ])),
            200,
            tool_request(json!([{"function": {"name": "weather", "arguments": {"city": "Paris"}}}])),
        )
        .await;

    let weather = FunctionToolCallback::from_fn("weather", "Current weather for a city", |input: CityInput| {
        assert_eq!(input.city, "Paris");
        Ok("sunny".to_string())
    });
    let model = fixture.chat_model(OllamaOptions::builder().model("llama3.2").build());
    let client = ChatClient::create(Arc::new(model));

    let response = client
        .prompt_text("What is the weather in Paris?")
        .tool_callbacks([Arc::new(weather) as Arc<dyn ToolCallback>])
        .call()
        .chat_response()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.result().unwrap().text(), "It is sunny in Paris.");
    // Usage accumulates across both round trips.
    assert_eq!(response.metadata.usage.prompt_tokens, 30);
    assert_eq!(response.metadata.usage.completion_tokens, 6);
    ask.assert_async().await;
    answer.assert_async().await;
}

#[tokio::test]
async fn test_return_direct_tools_are_joined_into_content() {
    let fixture = MockServerFixture::new().await;
    let _mock = fixture
        .mock_json(
            "POST",
            "/api/chat",
            None,
            200,
            tool_request(json!([
                {"function": {"name": "date", "arguments": {}}},
                {"function": {"name": "time", "arguments": {}}}
            ])),
        )
        .await;

    let date = FunctionToolCallback::from_fn("date", "Current date", |_: NoInput| {
        Ok("DATE=2025-10-18".to_string())
    })
    .with_return_direct(true);
    let time = FunctionToolCallback::from_fn("time", "Current time", |_: NoInput| {
        Ok("TIME=12:34:56.789".to_string())
    })
    .with_return_direct(true);

    let model = fixture.chat_model(OllamaOptions::builder().model("llama3.2").build());
    let client = ChatClient::builder(Arc::new(model))
        .default_tool_callbacks([
            Arc::new(date) as Arc<dyn ToolCallback>,
            Arc::new(time) as Arc<dyn ToolCallback>,
        ])
        .build();

    let content = client
        .prompt_text("What date and time is it?")
        .call()
        .content()
        .await
        .unwrap();
    assert_eq!(content.as_deref(), Some("DATE=2025-10-18\nTIME=12:34:56.789"));
}

#[tokio::test]
async fn test_stream_content_drops_empty_chunks() {
    let fixture = MockServerFixture::new().await;
    let _mock = fixture
        .mock_ndjson(
            "/api/chat",
            Some(Matcher::PartialJson(json!({"stream": true}))),
            vec![
                json!({"model": "llama3.2", "message": {"role": "assistant", "content": "Hello"}, "done": false}),
                json!({"model": "llama3.2", "message": {"role": "assistant", "content": ", world"}, "done": false}),
                json!({"model": "llama3.2", "message": {"role": "assistant", "content": ""}, "done": true, "done_reason": "stop"}),
            ],
            1,
        )
        .await;

    let model = fixture.chat_model(OllamaOptions::builder().model("llama3.2").build());
    let client = ChatClient::create(Arc::new(model));
    let parts: Vec<String> = client
        .prompt_text("Greet me")
        .stream()
        .content()
        .map(|part| part.unwrap())
        .collect()
        .await;
    assert_eq!(parts, vec!["Hello".to_string(), ", world".to_string()]);
}

#[tokio::test]
async fn test_streamed_tool_call_is_executed() {
    let fixture = MockServerFixture::new().await;
    let _answer = fixture
        .mock_ndjson(
            "/api/chat",
            Some(Matcher::Regex(r#""role":"tool""#.into())),
            vec![
                json!({"model": "llama3.2", "message": {"role": "assistant", "content": "Noon"}, "done": false}),
                json!({"model": "llama3.2", "message": {"role": "assistant", "content": ""}, "done": true, "done_reason": "stop"}),
            ],
            1,
        )
        .await;
    let _ask = fixture
        .mock_ndjson(
            "/api/chat",
            Some(only_user_message("What time is it\\?")),
            vec![
                json!({"model": "llama3.2", "message": {"role": "assistant", "content": "",
                       "tool_calls": [{"function": {"name": "clock", "arguments": {}}}]}, "done": false}),
                json!({"model": "llama3.2", "message": {"role": "assistant", "content": ""}, "done": true, "done_reason": "stop"}),
            ],
            1,
        )
        .await;

    let clock = FunctionToolCallback::from_fn("clock", "Current time", |_: NoInput| Ok("12:00".to_string()));
    let model = fixture.chat_model(
        OllamaOptions::builder()
            .model("llama3.2")
            .tool_callbacks(vec![Arc::new(clock)])
            .build(),
    );
    let client = ChatClient::create(Arc::new(model));
    let text: String = client
        .prompt_text("What time is it?")
        .stream()
        .content()
        .map(|part| part.unwrap())
        .collect::<Vec<_>>()
        .await
        .concat();
    assert_eq!(text, "Noon");
}
