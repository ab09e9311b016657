use super::api::{OllamaApi, DEFAULT_BASE_URL};
use super::dto::{self, Role};
use super::merge::merge;
use super::model_manager::{ModelManagementOptions, OllamaModelManager};
use super::options::OllamaOptions;
use crate::model::ChatModel;
use crate::options::ChatOptions;
use crate::tool::ToolCallingManager;
use crate::types::{
    AssistantMessage, ChatGenerationMetadata, ChatResponse, ChatResponseMetadata, Generation,
    Message, Metadata, Prompt, ToolCall, Usage,
};
use crate::{BoxStream, Error, ErrorContext, Result};
use async_recursion::async_recursion;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Map, Value};
use std::sync::Arc;

pub const DEFAULT_CHAT_MODEL: &str = "mistral";

/// Chat model backed by `/api/chat`.
///
/// Options are the model defaults overridden by the prompt's own options. When the
/// response asks for tools and internal tool execution is enabled, the tools are run
/// and the conversation is sent back until the model answers or a tool returns directly.
#[derive(Clone)]
pub struct OllamaChatModel {
    api: OllamaApi,
    default_options: OllamaOptions,
    tool_calling_manager: ToolCallingManager,
    model_management: ModelManagementOptions,
}

impl OllamaChatModel {
    pub fn builder() -> OllamaChatModelBuilder {
        OllamaChatModelBuilder::default()
    }

    pub fn api(&self) -> &OllamaApi {
        &self.api
    }

    pub fn options(&self) -> &OllamaOptions {
        &self.default_options
    }

    /// Pull the default model (and any additional ones) per the management strategy.
    pub async fn initialize(&self) -> Result<()> {
        let manager = OllamaModelManager::new(self.api.clone(), self.model_management.clone());
        let models: Vec<String> = self.default_options.model.iter().cloned().collect();
        manager.pull_models(&models).await
    }

    fn merged_options(&self, prompt: &Prompt) -> OllamaOptions {
        match prompt.options() {
            Some(runtime) => self
                .default_options
                .merge(&OllamaOptions::from_options(runtime)),
            None => self.default_options.clone(),
        }
    }

    /// The wire request for `prompt` with already merged `options`.
    pub fn create_request(
        &self,
        prompt: &Prompt,
        options: &OllamaOptions,
        stream: bool,
    ) -> Result<dto::ChatRequest> {
        let messages = to_ollama_messages(prompt.instructions())?;
        let tools = self
            .tool_calling_manager
            .resolve_tool_definitions(&options.tool_calling)?
            .into_iter()
            .map(|d| dto::Tool::function(d.name, d.description, d.input_schema))
            .collect();

        let mut request = dto::ChatRequest::new(options.model.clone().unwrap_or_default(), messages)
            .streaming(stream);
        request.format = options.effective_format();
        request.keep_alive = options.keep_alive.clone();
        request.think = options.think.clone();
        request.options = options.to_request_options();
        request.tools = tools;
        Ok(request)
    }

    fn wants_tool_execution(options: &OllamaOptions, response: &ChatResponse) -> bool {
        options.tool_calling.is_internal_tool_execution_enabled() && response.has_tool_calls()
    }

    #[async_recursion]
    async fn internal_call(&self, prompt: Prompt, previous: Usage) -> Result<ChatResponse> {
        let options = self.merged_options(&prompt);
        let request = self.create_request(&prompt, &options, false)?;
        let raw = self.api.chat(&request).await?;
        let response = to_chat_response(&raw, previous);

        if !Self::wants_tool_execution(&options, &response) {
            return Ok(response);
        }

        let tool_prompt = Prompt::with_options(prompt.instructions().to_vec(), Some(Box::new(options.clone())));
        let result = self
            .tool_calling_manager
            .execute_tool_calls(&tool_prompt, &response)
            .await?;
        if result.return_direct {
            return Ok(ChatResponse::with_metadata(
                result.build_generations(),
                response.metadata,
            ));
        }
        tracing::debug!(model = %request.model, "sending tool results back to the model");
        let next = Prompt::with_options(result.conversation_history, Some(Box::new(options)));
        self.internal_call(next, response.metadata.usage).await
    }

    fn internal_stream(self: Arc<Self>, prompt: Prompt, previous: Usage) -> BoxStream<'static, ChatResponse> {
        Box::pin(async_stream::try_stream! {
            let options = self.merged_options(&prompt);
            let request = self.create_request(&prompt, &options, true)?;
            let mut chunks = self.api.stream_chat(&request).await?;
            let execute_tools = options.tool_calling.is_internal_tool_execution_enabled();

            // Tool calls may be split across chunks; they are folded and run once the stream ends.
            let mut tool_chunk: Option<dto::ChatResponse> = None;
            let mut usage = previous;
            while let Some(chunk) = chunks.next().await {
                let chunk = chunk?;
                let has_tool_calls = chunk
                    .message
                    .as_ref()
                    .and_then(|m| m.tool_calls.as_ref())
                    .is_some_and(|calls| !calls.is_empty());
                if has_tool_calls && execute_tools {
                    tool_chunk = Some(match tool_chunk.take() {
                        Some(buffered) => merge(buffered, chunk),
                        None => chunk,
                    });
                } else {
                    let response = to_chat_response(&chunk, previous);
                    usage = response.metadata.usage;
                    yield response;
                }
            }

            if let Some(buffered) = tool_chunk {
                let response = to_chat_response(&buffered, usage);
                let tool_prompt = Prompt::with_options(
                    prompt.instructions().to_vec(),
                    Some(Box::new(options.clone())),
                );
                let result = self
                    .tool_calling_manager
                    .execute_tool_calls(&tool_prompt, &response)
                    .await?;
                if result.return_direct {
                    yield ChatResponse::with_metadata(result.build_generations(), response.metadata);
                } else {
                    let next = Prompt::with_options(result.conversation_history, Some(Box::new(options)));
                    let mut follow_up = self.clone().internal_stream(next, usage);
                    while let Some(response) = follow_up.next().await {
                        yield response?;
                    }
                }
            }
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChatModel {
    async fn call(&self, prompt: Prompt) -> Result<ChatResponse> {
        self.internal_call(prompt, Usage::default()).await
    }

    fn stream(self: Arc<Self>, prompt: Prompt) -> BoxStream<'static, ChatResponse> {
        self.internal_stream(prompt, Usage::default())
    }

    fn default_options(&self) -> Option<Box<dyn ChatOptions>> {
        Some(Box::new(self.default_options.clone()))
    }
}

fn to_ollama_messages(messages: &[Message]) -> Result<Vec<dto::Message>> {
    let mut converted = Vec::with_capacity(messages.len());
    for message in messages {
        match message {
            Message::System(m) => converted.push(dto::Message::new(Role::System, &m.text)),
            Message::Developer(m) => converted.push(dto::Message::new(Role::System, &m.text)),
            Message::User(m) => {
                let mut user = dto::Message::new(Role::User, &m.text);
                if !m.media.is_empty() {
                    user.images = Some(m.media.iter().map(|media| media.to_base64()).collect());
                }
                converted.push(user);
            }
            Message::Assistant(m) => {
                let mut assistant = dto::Message::new(Role::Assistant, &m.text);
                if m.has_tool_calls() {
                    let calls = m
                        .tool_calls
                        .iter()
                        .map(|call| {
                            Ok(dto::ToolCall {
                                function: dto::ToolCallFunction {
                                    name: call.name.clone(),
                                    arguments: parse_arguments(&call.arguments)?,
                                    index: None,
                                },
                            })
                        })
                        .collect::<Result<Vec<_>>>()?;
                    assistant.tool_calls = Some(calls);
                }
                converted.push(assistant);
            }
            Message::Tool(m) => {
                for response in &m.responses {
                    let mut tool = dto::Message::new(Role::Tool, &response.response_data);
                    tool.tool_name = Some(response.name.clone());
                    converted.push(tool);
                }
            }
        }
    }
    Ok(converted)
}

fn parse_arguments(arguments: &str) -> Result<Map<String, Value>> {
    if arguments.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(arguments)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::validation_with_context(
            format!("Tool call arguments must be a JSON object, got: {}", other),
            ErrorContext::new().with_field_path("tool_calls.arguments"),
        )),
    }
}

/// Portable response for one wire response; `previous` usage is added to its counters.
fn to_chat_response(raw: &dto::ChatResponse, previous: Usage) -> ChatResponse {
    let message = raw
        .message
        .clone()
        .unwrap_or_else(|| dto::Message::new(Role::Assistant, ""));

    let tool_calls = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            ToolCall::function(
                uuid::Uuid::new_v4().to_string(),
                call.function.name,
                Value::Object(call.function.arguments).to_string(),
            )
        })
        .collect();
    let mut output = AssistantMessage::new(message.content).with_tool_calls(tool_calls);
    if let Some(thinking) = message.thinking {
        output.metadata.insert("thinking".into(), thinking.into());
    }

    let generation_metadata = match &raw.done_reason {
        Some(reason) => ChatGenerationMetadata::with_finish_reason(reason),
        None => ChatGenerationMetadata::default(),
    };

    let usage = Usage::new(
        previous.prompt_tokens + raw.prompt_eval_count.unwrap_or(0),
        previous.completion_tokens + raw.eval_count.unwrap_or(0),
    );
    let mut extra = Metadata::new();
    if let Some(created_at) = raw.created_at {
        extra.insert("created_at".into(), created_at.to_rfc3339().into());
    }
    for (key, value) in [
        ("total_duration", raw.total_duration),
        ("load_duration", raw.load_duration),
        ("prompt_eval_duration", raw.prompt_eval_duration),
        ("eval_duration", raw.eval_duration),
    ] {
        if let Some(nanos) = value {
            extra.insert(key.into(), nanos.into());
        }
    }
    if let Some(done) = raw.done {
        extra.insert("done".into(), done.into());
    }

    ChatResponse::with_metadata(
        vec![Generation::with_metadata(output, generation_metadata)],
        ChatResponseMetadata {
            id: String::new(),
            model: raw.model.clone().unwrap_or_default(),
            usage,
            extra,
        },
    )
}

#[derive(Default)]
pub struct OllamaChatModelBuilder {
    api: Option<OllamaApi>,
    default_options: Option<OllamaOptions>,
    tool_calling_manager: Option<ToolCallingManager>,
    model_management: ModelManagementOptions,
}

impl OllamaChatModelBuilder {
    pub fn api(mut self, api: OllamaApi) -> Self {
        self.api = Some(api);
        self
    }

    pub fn default_options(mut self, options: OllamaOptions) -> Self {
        self.default_options = Some(options);
        self
    }

    pub fn tool_calling_manager(mut self, manager: ToolCallingManager) -> Self {
        self.tool_calling_manager = Some(manager);
        self
    }

    pub fn model_management(mut self, options: ModelManagementOptions) -> Self {
        self.model_management = options;
        self
    }

    pub fn build(self) -> Result<OllamaChatModel> {
        let api = match self.api {
            Some(api) => api,
            None => OllamaApi::new(DEFAULT_BASE_URL)?,
        };
        let mut default_options = self.default_options.unwrap_or_default();
        if default_options.model.as_deref().map_or(true, str::is_empty) {
            default_options.model = Some(DEFAULT_CHAT_MODEL.to_string());
        }
        Ok(OllamaChatModel {
            api,
            default_options,
            tool_calling_manager: self.tool_calling_manager.unwrap_or_default(),
            model_management: self.model_management,
        })
    }
}
