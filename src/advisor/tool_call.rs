use super::aggregator::MessageAggregator;
use super::chain::{CallAdvisorChain, StreamAdvisorChain};
use super::request::{ChatClientRequest, ChatClientResponse};
use super::{Advisor, CallAdvisor, StreamAdvisor, HIGHEST_PRECEDENCE, LOWEST_PRECEDENCE};
use crate::options::ChatOptions;
use crate::tool::{ToolCallingManager, ToolExecutionResult};
use crate::types::{ChatResponse, Message, Prompt};
use crate::{BoxStream, Error, ErrorContext, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

/// Runs the tool-calling loop on the client side instead of inside the model.
///
/// Internal tool execution is switched off on a copy of the request options; the advisor
/// then calls the rest of the chain, executes any requested tools and calls again until
/// the model answers without tool calls or a return-direct tool ends the loop.
#[derive(Clone)]
pub struct ToolCallAdvisor {
    manager: ToolCallingManager,
    order: i32,
    conversation_history_enabled: bool,
    stream_tool_call_responses: bool,
}

impl ToolCallAdvisor {
    pub fn builder() -> ToolCallAdvisorBuilder {
        ToolCallAdvisorBuilder::default()
    }

    fn prepare_options(&self, prompt: &Prompt) -> Result<Box<dyn ChatOptions>> {
        let mut options = prompt
            .options()
            .filter(|o| o.tool_calling().is_some())
            .map(|o| o.clone_options())
            .ok_or_else(|| {
                Error::validation_with_context(
                    "ToolCall Advisor requires tool calling options to be set in the ChatClientRequest options.",
                    ErrorContext::new().with_field_path("prompt.options"),
                )
            })?;
        if let Some(tools) = options.tool_calling_mut() {
            tools.internal_tool_execution_enabled = Some(false);
        }
        Ok(options)
    }

    fn next_instructions(&self, request: &ChatClientRequest, result: &ToolExecutionResult) -> Vec<Message> {
        if self.conversation_history_enabled {
            return result.conversation_history.clone();
        }
        let mut next = Vec::with_capacity(2);
        if let Some(system) = request.prompt().system_message() {
            next.push(Message::System(system.clone()));
        }
        if let Some(last) = result.conversation_history.last() {
            next.push(last.clone());
        }
        next
    }
}

fn return_direct_response(
    response: &ChatClientResponse,
    chat: &ChatResponse,
    result: &ToolExecutionResult,
) -> Result<ChatClientResponse> {
    let chat = ChatResponse::with_metadata(result.build_generations(), chat.metadata.clone());
    response.mutate().chat_response(Some(chat)).build()
}

impl Advisor for ToolCallAdvisor {
    fn name(&self) -> &str {
        "Tool Calling Advisor"
    }

    fn order(&self) -> i32 {
        self.order
    }
}

#[async_trait]
impl CallAdvisor for ToolCallAdvisor {
    async fn advise_call(
        &self,
        request: ChatClientRequest,
        chain: &CallAdvisorChain,
    ) -> Result<ChatClientResponse> {
        let options = self.prepare_options(request.prompt())?;
        let mut instructions = request.prompt().instructions().to_vec();

        loop {
            let processed = ChatClientRequest::new(
                Prompt::with_options(instructions, Some(options.clone())),
                request.context().clone(),
            )?;
            let response = chain.next_call(processed.copy()).await?;

            let Some(chat) = response.chat_response().filter(|c| c.has_tool_calls()) else {
                return Ok(response);
            };

            let result = self
                .manager
                .execute_tool_calls(processed.prompt(), chat)
                .await?;
            if result.return_direct {
                return return_direct_response(&response, chat, &result);
            }
            instructions = self.next_instructions(&processed, &result);
        }
    }
}

impl StreamAdvisor for ToolCallAdvisor {
    fn advise_stream(
        self: Arc<Self>,
        request: ChatClientRequest,
        chain: StreamAdvisorChain,
    ) -> BoxStream<'static, ChatClientResponse> {
        let options = match self.prepare_options(request.prompt()) {
            Ok(options) => options,
            Err(e) => return Box::pin(futures::stream::once(async move { Err(e) })),
        };

        Box::pin(async_stream::try_stream! {
            let mut instructions = request.prompt().instructions().to_vec();
            loop {
                let processed = ChatClientRequest::new(
                    Prompt::with_options(instructions.clone(), Some(options.clone())),
                    request.context().clone(),
                )?;

                let mut upstream = chain.next_stream(processed.copy());
                let mut aggregator = MessageAggregator::new();
                let mut buffered = Vec::new();
                while let Some(chunk) = upstream.next().await {
                    let chunk = chunk?;
                    aggregator.add(&chunk);
                    if self.stream_tool_call_responses {
                        yield chunk;
                    } else {
                        buffered.push(chunk);
                    }
                }

                let Some(aggregated) = aggregator.finish() else {
                    break;
                };
                let tool_chat = aggregated
                    .chat_response()
                    .filter(|c| c.has_tool_calls())
                    .cloned();
                let Some(chat) = tool_chat else {
                    for chunk in buffered {
                        yield chunk;
                    }
                    break;
                };

                let result = self
                    .manager
                    .execute_tool_calls(processed.prompt(), &chat)
                    .await?;
                if result.return_direct {
                    yield return_direct_response(&aggregated, &chat, &result)?;
                    break;
                }
                instructions = self.next_instructions(&processed, &result);
            }
        })
    }
}

pub struct ToolCallAdvisorBuilder {
    manager: ToolCallingManager,
    order: i32,
    conversation_history_enabled: bool,
    stream_tool_call_responses: bool,
}

impl Default for ToolCallAdvisorBuilder {
    fn default() -> Self {
        Self {
            manager: ToolCallingManager::default(),
            order: HIGHEST_PRECEDENCE + 300,
            conversation_history_enabled: true,
            stream_tool_call_responses: true,
        }
    }
}

impl ToolCallAdvisorBuilder {
    pub fn tool_calling_manager(mut self, manager: ToolCallingManager) -> Self {
        self.manager = manager;
        self
    }

    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// When disabled, each follow-up call only carries the system message and the
    /// latest tool responses.
    pub fn conversation_history_enabled(mut self, enabled: bool) -> Self {
        self.conversation_history_enabled = enabled;
        self
    }

    /// When disabled, streamed chunks of tool-call rounds are swallowed and only the final
    /// answer is emitted.
    pub fn stream_tool_call_responses(mut self, enabled: bool) -> Self {
        self.stream_tool_call_responses = enabled;
        self
    }

    pub fn build(self) -> Result<ToolCallAdvisor> {
        if self.order <= HIGHEST_PRECEDENCE || self.order >= LOWEST_PRECEDENCE {
            return Err(Error::validation(
                "advisorOrder must be between HIGHEST_PRECEDENCE and LOWEST_PRECEDENCE",
            ));
        }
        Ok(ToolCallAdvisor {
            manager: self.manager,
            order: self.order,
            conversation_history_enabled: self.conversation_history_enabled,
            stream_tool_call_responses: self.stream_tool_call_responses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::{AdvisorChainBuilder, AdvisorContext, AdvisorHandle};
    use crate::model::ChatModel;
    use crate::options::DefaultChatOptions;
    use crate::tool::{FunctionToolCallback, RETURN_DIRECT_FINISH_REASON};
    use crate::types::{AssistantMessage, Generation, ToolCall};
    use schemars::JsonSchema;
    use serde::Deserialize;
    use std::sync::Mutex;

    #[derive(Deserialize, JsonSchema)]
    struct NoInput {}

    /// Asks for the `clock` tool until a tool response is present, then answers.
    struct ScriptedModel {
        prompts: Arc<Mutex<Vec<Prompt>>>,
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn call(&self, prompt: Prompt) -> Result<ChatResponse> {
            self.prompts.lock().unwrap().push(prompt.clone());
            let answered = prompt
                .instructions()
                .iter()
                .any(|m| matches!(m, Message::Tool(_)));
            let output = if answered {
                AssistantMessage::new("It is noon")
            } else {
                AssistantMessage::new("")
                    .with_tool_calls(vec![ToolCall::function("c1", "clock", "{}")])
            };
            Ok(ChatResponse::new(vec![Generation::new(output)]))
        }
    }

    fn request(direct: bool) -> ChatClientRequest {
        let clock = FunctionToolCallback::from_fn("clock", "time", |_: NoInput| {
            Ok("12:00".to_string())
        })
        .with_return_direct(direct);
        let options = DefaultChatOptions::builder()
            .tool_callbacks(vec![Arc::new(clock)])
            .build();
        let prompt = Prompt::builder()
            .message(Message::system("sys"))
            .message(Message::user("time?"))
            .options(Box::new(options))
            .build();
        ChatClientRequest::new(prompt, AdvisorContext::new()).unwrap()
    }

    fn chain(
        advisor: ToolCallAdvisor,
        prompts: Arc<Mutex<Vec<Prompt>>>,
    ) -> (CallAdvisorChain, StreamAdvisorChain) {
        let builder = AdvisorChainBuilder::new().push(AdvisorHandle::both(advisor));
        let model = Arc::new(ScriptedModel { prompts });
        (
            builder.build_call_chain(model.clone()),
            builder.build_stream_chain(model),
        )
    }

    #[tokio::test]
    async fn test_loops_until_no_tool_calls() {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let (call, _) = chain(ToolCallAdvisor::builder().build().unwrap(), prompts.clone());
        let response = call.next_call(request(false)).await.unwrap();

        assert_eq!(
            response.chat_response().unwrap().result().unwrap().text(),
            "It is noon"
        );
        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        // system, user, assistant(tool call), tool response
        assert_eq!(prompts[1].instructions().len(), 4);
        let internal = prompts[0]
            .options()
            .unwrap()
            .tool_calling()
            .unwrap()
            .is_internal_tool_execution_enabled();
        assert!(!internal);
    }

    #[tokio::test]
    async fn test_without_history_sends_system_and_tool_response() {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let advisor = ToolCallAdvisor::builder()
            .conversation_history_enabled(false)
            .build()
            .unwrap();
        let (call, _) = chain(advisor, prompts.clone());
        call.next_call(request(false)).await.unwrap();

        let prompts = prompts.lock().unwrap();
        let second = prompts[1].instructions();
        assert_eq!(second.len(), 2);
        assert!(matches!(second[0], Message::System(_)));
        assert!(matches!(second[1], Message::Tool(_)));
    }

    #[tokio::test]
    async fn test_return_direct_stops_loop() {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let (call, _) = chain(ToolCallAdvisor::builder().build().unwrap(), prompts.clone());
        let response = call.next_call(request(true)).await.unwrap();
        let generation = response.chat_response().unwrap().result().unwrap().clone();
        assert_eq!(generation.text(), "12:00");
        assert_eq!(generation.finish_reason(), Some(RETURN_DIRECT_FINISH_REASON));
        assert_eq!(prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stream_emits_final_answer() {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let advisor = ToolCallAdvisor::builder()
            .stream_tool_call_responses(false)
            .build()
            .unwrap();
        let (_, stream) = chain(advisor, prompts);
        let items: Vec<ChatClientResponse> = stream
            .next_stream(request(false))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(items.len(), 1);
        assert_eq!(
            items[0].chat_response().unwrap().result().unwrap().text(),
            "It is noon"
        );
    }

    #[test]
    fn test_order_bounds() {
        assert!(ToolCallAdvisor::builder()
            .order(HIGHEST_PRECEDENCE)
            .build()
            .is_err());
    }

    #[tokio::test]
    async fn test_requires_tool_calling_options() {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let (call, _) = chain(ToolCallAdvisor::builder().build().unwrap(), prompts);
        let request =
            ChatClientRequest::new(Prompt::from_text("q"), AdvisorContext::new()).unwrap();
        assert!(call.next_call(request).await.unwrap_err().is_validation());
    }
}
