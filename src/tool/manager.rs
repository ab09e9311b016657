use super::resolver::{StaticToolCallbackResolver, ToolCallbackResolver};
use super::{ToolCallback, ToolContext, ToolDefinition, TOOL_CALL_HISTORY};
use crate::options::ToolCallingOptions;
use crate::types::{
    AssistantMessage, ChatGenerationMetadata, Generation, Message, Prompt, ToolResponse,
    ToolResponseMessage,
};
use crate::{Error, ErrorContext, Result};
use std::sync::Arc;

/// Finish reason stamped on generations built from return-direct tool results.
pub const RETURN_DIRECT_FINISH_REASON: &str = "returnDirect";

/// Turns a failing tool into text for the model, or propagates the error.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolExecutionErrorProcessor {
    always_throw: bool,
}

impl ToolExecutionErrorProcessor {
    pub fn new(always_throw: bool) -> Self {
        Self { always_throw }
    }

    pub fn process(&self, tool_name: &str, error: Error) -> Result<String> {
        if self.always_throw {
            return Err(error);
        }
        tracing::debug!(tool = tool_name, error = %error, "tool execution failed");
        Ok(error.to_string())
    }
}

/// Outcome of executing the tool calls of one model response.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolExecutionResult {
    /// Prompt messages, the assistant message that requested the tools, then the tool responses.
    pub conversation_history: Vec<Message>,
    pub return_direct: bool,
}

impl ToolExecutionResult {
    /// One generation per tool response, for handing tool output straight to the caller.
    pub fn build_generations(&self) -> Vec<Generation> {
        let Some(Message::Tool(responses)) = self.conversation_history.last() else {
            return Vec::new();
        };
        responses
            .responses
            .iter()
            .map(|response| {
                let mut output = AssistantMessage::new(response.response_data.clone());
                output
                    .metadata
                    .insert("tool_name".into(), response.name.clone().into());
                output
                    .metadata
                    .insert("tool_id".into(), response.id.clone().into());
                Generation::with_metadata(
                    output,
                    ChatGenerationMetadata::with_finish_reason(RETURN_DIRECT_FINISH_REASON),
                )
            })
            .collect()
    }
}

/// Resolves tool definitions and executes the tool calls a model asks for.
#[derive(Clone)]
pub struct ToolCallingManager {
    resolver: Arc<dyn ToolCallbackResolver>,
    error_processor: ToolExecutionErrorProcessor,
}

impl Default for ToolCallingManager {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ToolCallingManager {
    pub fn builder() -> ToolCallingManagerBuilder {
        ToolCallingManagerBuilder::default()
    }

    /// Definitions for every callback in `options`, followed by every named tool that
    /// is not already present as a callback.
    pub fn resolve_tool_definitions(&self, options: &ToolCallingOptions) -> Result<Vec<ToolDefinition>> {
        let mut definitions: Vec<ToolDefinition> = options
            .tool_callbacks
            .iter()
            .map(|c| c.definition())
            .collect();

        for name in &options.tool_names {
            if definitions.iter().any(|d| &d.name == name) {
                continue;
            }
            let callback = self.resolve(name)?;
            definitions.push(callback.definition());
        }
        Ok(definitions)
    }

    /// Execute the tool calls of the first generation that has any.
    pub async fn execute_tool_calls(
        &self,
        prompt: &Prompt,
        response: &crate::types::ChatResponse,
    ) -> Result<ToolExecutionResult> {
        let assistant = response
            .results
            .iter()
            .map(|g| &g.output)
            .find(|m| m.has_tool_calls())
            .ok_or_else(|| Error::runtime("No tool call requested by the chat model"))?;

        let options = prompt
            .options()
            .and_then(|o| o.tool_calling())
            .cloned()
            .unwrap_or_default();
        let context = build_tool_context(prompt, &options, assistant);

        let mut responses = Vec::with_capacity(assistant.tool_calls.len());
        let mut return_direct: Option<bool> = None;

        for call in &assistant.tool_calls {
            tracing::debug!(tool = %call.name, "executing tool call");
            let callback = match options
                .tool_callbacks
                .iter()
                .find(|c| c.definition().name == call.name)
            {
                Some(c) => c.clone(),
                None => self.resolve(&call.name)?,
            };

            let direct = callback.metadata().return_direct;
            return_direct = Some(return_direct.map_or(direct, |acc| acc && direct));

            let result = match callback.call(&call.arguments, &context).await {
                Ok(result) => result,
                Err(e) => self.error_processor.process(&call.name, e)?,
            };
            responses.push(ToolResponse::new(call.id.clone(), call.name.clone(), result));
        }

        let mut conversation_history = prompt.instructions().to_vec();
        conversation_history.push(Message::Assistant(assistant.clone()));
        conversation_history.push(Message::Tool(ToolResponseMessage::new(responses)));

        Ok(ToolExecutionResult {
            conversation_history,
            return_direct: return_direct.unwrap_or(false),
        })
    }

    fn resolve(&self, name: &str) -> Result<Arc<dyn ToolCallback>> {
        self.resolver.resolve(name).ok_or_else(|| {
            Error::runtime_with_context(
                format!("No ToolCallback found for tool name: {}", name),
                ErrorContext::new().with_field_path("tool_names"),
            )
        })
    }
}

fn build_tool_context(
    prompt: &Prompt,
    options: &ToolCallingOptions,
    assistant: &AssistantMessage,
) -> ToolContext {
    if options.tool_context.is_empty() {
        return ToolContext::default();
    }
    let mut context = options.tool_context.clone();
    let mut history = prompt.instructions().to_vec();
    history.push(Message::Assistant(assistant.clone()));
    if let Ok(history) = serde_json::to_value(history) {
        context.insert(TOOL_CALL_HISTORY.to_string(), history);
    }
    ToolContext::new(context)
}

#[derive(Default)]
pub struct ToolCallingManagerBuilder {
    resolver: Option<Arc<dyn ToolCallbackResolver>>,
    error_processor: ToolExecutionErrorProcessor,
}

impl ToolCallingManagerBuilder {
    pub fn resolver(mut self, resolver: Arc<dyn ToolCallbackResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn error_processor(mut self, processor: ToolExecutionErrorProcessor) -> Self {
        self.error_processor = processor;
        self
    }

    pub fn build(self) -> ToolCallingManager {
        ToolCallingManager {
            resolver: self
                .resolver
                .unwrap_or_else(|| Arc::new(StaticToolCallbackResolver::default())),
            error_processor: self.error_processor,
        }
    }
}
