use super::request::{AdvisorContext, ChatClientResponse};
use crate::types::{
    AssistantMessage, ChatGenerationMetadata, ChatResponse, ChatResponseMetadata, Generation,
    ToolCall,
};
use crate::{BoxStream, Result};
use futures::StreamExt;

/// Folds a stream of responses into one: text is concatenated, tool calls are
/// accumulated, the latest metadata wins.
#[derive(Debug, Default)]
pub struct MessageAggregator {
    text: String,
    tool_calls: Vec<ToolCall>,
    generation_metadata: ChatGenerationMetadata,
    metadata: ChatResponseMetadata,
    context: AdvisorContext,
    seen: bool,
}

impl MessageAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, response: &ChatClientResponse) {
        self.seen = true;
        self.context = response.context().clone();
        let Some(chat) = response.chat_response() else {
            return;
        };
        if let Some(generation) = chat.result() {
            self.text.push_str(generation.text());
            self.tool_calls
                .extend(generation.output.tool_calls.iter().cloned());
            if generation.metadata.finish_reason.is_some() {
                self.generation_metadata = generation.metadata.clone();
            }
        }
        let meta = &chat.metadata;
        if !meta.id.is_empty() {
            self.metadata.id = meta.id.clone();
        }
        if !meta.model.is_empty() {
            self.metadata.model = meta.model.clone();
        }
        if meta.usage.prompt_tokens > 0 {
            self.metadata.usage.prompt_tokens = meta.usage.prompt_tokens;
        }
        if meta.usage.completion_tokens > 0 {
            self.metadata.usage.completion_tokens = meta.usage.completion_tokens;
        }
        if meta.usage.total_tokens > 0 {
            self.metadata.usage.total_tokens = meta.usage.total_tokens;
        }
        self.metadata
            .extra
            .extend(meta.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// The aggregated response, or `None` if nothing was added.
    pub fn finish(self) -> Option<ChatClientResponse> {
        if !self.seen {
            return None;
        }
        let output = AssistantMessage::new(self.text).with_tool_calls(self.tool_calls);
        let chat = ChatResponse::with_metadata(
            vec![Generation::with_metadata(output, self.generation_metadata)],
            self.metadata,
        );
        ChatClientResponse::new(Some(chat), self.context).ok()
    }

    /// Pass every element through and hand the aggregate to `on_complete` once the
    /// stream ends without error.
    pub fn aggregate<F>(
        mut stream: BoxStream<'static, ChatClientResponse>,
        on_complete: F,
    ) -> BoxStream<'static, ChatClientResponse>
    where
        F: FnOnce(ChatClientResponse) + Send + 'static,
    {
        Box::pin(async_stream::try_stream! {
            let mut aggregator = MessageAggregator::new();
            while let Some(item) = stream.next().await {
                let item = item?;
                aggregator.add(&item);
                yield item;
            }
            if let Some(aggregated) = aggregator.finish() {
                on_complete(aggregated);
            }
        })
    }

    /// Drain the stream and return the aggregate together with the raw chunks.
    pub async fn collect(
        mut stream: BoxStream<'static, ChatClientResponse>,
    ) -> Result<(Option<ChatClientResponse>, Vec<ChatClientResponse>)> {
        let mut aggregator = MessageAggregator::new();
        let mut chunks = Vec::new();
        while let Some(item) = stream.next().await {
            let item = item?;
            aggregator.add(&item);
            chunks.push(item);
        }
        Ok((aggregator.finish(), chunks))
    }
}
