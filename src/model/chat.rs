use crate::options::ChatOptions;
use crate::types::{ChatResponse, Prompt};
use crate::{BoxStream, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// A backend capable of producing chat completions.
#[async_trait]
pub trait ChatModel: Send + Sync + 'static {
    async fn call(&self, prompt: Prompt) -> Result<ChatResponse>;

    /// Streamed completion, one response per chunk. Models without native streaming
    /// emit the single `call` result.
    fn stream(self: Arc<Self>, prompt: Prompt) -> BoxStream<'static, ChatResponse> {
        Box::pin(futures::stream::once(async move { self.call(prompt).await }))
    }

    /// Options applied when a prompt carries none of its own.
    fn default_options(&self) -> Option<Box<dyn ChatOptions>> {
        None
    }
}
