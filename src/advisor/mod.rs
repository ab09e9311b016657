//! 顾问链模块：围绕聊天模型调用（同步与流式）的有序拦截器管道。
//!
//! # Advisor Chain
//!
//! Advisors wrap a single call (or stream) to a [`ChatModel`](crate::model::ChatModel)
//! in onion order. For advisors with orders `p1 < p2 < ... < pN` the call nests as
//! `a1(a2(...aN(model)...))`: the lowest order runs its "before" logic first and its
//! "after" logic last, so it can see and override everything inner advisors wrote.
//!
//! ```text
//!  request ─► a1.before ─► a2.before ─► ... ─► model
//!  response ◄─ a1.after ◄─ a2.after ◄─ ... ◄──┘
//! ```
//!
//! Advisors communicate through the per-request [`AdvisorContext`] carried by
//! [`ChatClientRequest`] / [`ChatClientResponse`]. Both are immutable values; rewriting a
//! request produces a new one with a copied context.
//!
//! Errors raised by an advisor propagate unchanged through every outer advisor. Nothing
//! in the chain retries.
//!
//! | Advisor | Purpose |
//! |---------|---------|
//! | [`SimpleLoggerAdvisor`] | Logs requests and responses through `tracing` |
//! | [`ToolCallAdvisor`] | Client-side tool execution loop |
//! | [`StructuredOutputValidationAdvisor`] | Re-prompts until the answer matches a JSON schema |
//! | [`MessageChatMemoryAdvisor`] | Adds conversation memory to the prompt |
//! | [`QuestionAnswerAdvisor`] | Retrieval-augmented generation over a vector store |
//! | [`ResponseCacheAdvisor`] | Answers repeated prompts from a cache without calling the model |

mod aggregator;
mod base;
mod cache;
mod chain;
mod legacy;
mod logger;
mod memory;
mod question_answer;
mod request;
mod structured_output;
mod tool_call;

pub use aggregator::MessageAggregator;
pub use base::{BaseAdvisor, BaseAdvisorAdapter};
pub use cache::{ResponseCacheAdvisor, CACHE_HIT};
pub use chain::{
    AdvisorChainBuilder, AdvisorHandle, CallAdvisorChain, ChatModelCallAdvisor,
    ChatModelStreamAdvisor, StreamAdvisorChain,
};
pub use legacy::{AdvisedRequest, AdvisedRequestBuilder, AdvisedResponse, FORMAT_PARAM};
pub use logger::SimpleLoggerAdvisor;
pub use memory::{
    ChatMemory, InMemoryChatMemoryRepository, MessageChatMemoryAdvisor, MessageWindowChatMemory,
    CONVERSATION_ID, DEFAULT_CONVERSATION_ID,
};
pub use question_answer::{
    QuestionAnswerAdvisor, FILTER_EXPRESSION, RETRIEVED_DOCUMENTS,
};
pub use request::{
    AdvisorContext, ChatClientRequest, ChatClientRequestBuilder, ChatClientResponse,
    ChatClientResponseBuilder,
};
pub use structured_output::StructuredOutputValidationAdvisor;
pub use tool_call::{ToolCallAdvisor, ToolCallAdvisorBuilder};

use crate::{BoxStream, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Outermost position in the chain.
pub const HIGHEST_PRECEDENCE: i32 = i32::MIN;

/// Innermost position in the chain.
pub const LOWEST_PRECEDENCE: i32 = i32::MAX;

/// Common identity of every advisor.
pub trait Advisor: Send + Sync {
    /// Used for diagnostics and for locating the advisor in a chain.
    fn name(&self) -> &str;

    /// Lower runs earlier on the way in and later on the way out.
    fn order(&self) -> i32 {
        0
    }
}

/// Around-advice for a synchronous call.
#[async_trait]
pub trait CallAdvisor: Advisor {
    /// Must call `chain.next_call` to reach the model; not calling it short-circuits.
    async fn advise_call(
        &self,
        request: ChatClientRequest,
        chain: &CallAdvisorChain,
    ) -> Result<ChatClientResponse>;
}

/// Around-advice for a streamed call.
pub trait StreamAdvisor: Advisor {
    fn advise_stream(
        self: Arc<Self>,
        request: ChatClientRequest,
        chain: StreamAdvisorChain,
    ) -> BoxStream<'static, ChatClientResponse>;
}
