use super::aggregator::MessageAggregator;
use super::chain::{CallAdvisorChain, StreamAdvisorChain};
use super::request::{ChatClientRequest, ChatClientResponse};
use super::{Advisor, CallAdvisor, StreamAdvisor, HIGHEST_PRECEDENCE};
use crate::cache::{CacheKey, CacheManager};
use crate::types::ChatResponse;
use crate::{BoxStream, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

/// Context key set to `true` on responses served from the cache.
pub const CACHE_HIT: &str = "response_cache_hit";

/// Answers a repeated prompt from a cache instead of calling the rest of the chain.
///
/// On a hit the chain is not invoked at all, so advisors ordered after this one never run.
pub struct ResponseCacheAdvisor {
    cache: Arc<CacheManager>,
    order: i32,
}

impl ResponseCacheAdvisor {
    pub const DEFAULT_ORDER: i32 = HIGHEST_PRECEDENCE + 500;

    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self {
            cache,
            order: Self::DEFAULT_ORDER,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    async fn lookup(&self, request: &ChatClientRequest) -> Result<(CacheKey, Option<ChatClientResponse>)> {
        let key = CacheKey::for_prompt(request.prompt())?;
        let cached: Option<ChatResponse> = self.cache.get(&key).await?;
        let hit = match cached {
            Some(chat) => {
                tracing::debug!(key = %key, "response cache hit");
                Some(
                    ChatClientResponse::builder()
                        .chat_response(Some(chat))
                        .context(request.context().clone())
                        .context_entry(CACHE_HIT, true)
                        .build()?,
                )
            }
            None => None,
        };
        Ok((key, hit))
    }
}

impl Advisor for ResponseCacheAdvisor {
    fn name(&self) -> &str {
        "ResponseCacheAdvisor"
    }

    fn order(&self) -> i32 {
        self.order
    }
}

#[async_trait]
impl CallAdvisor for ResponseCacheAdvisor {
    async fn advise_call(
        &self,
        request: ChatClientRequest,
        chain: &CallAdvisorChain,
    ) -> Result<ChatClientResponse> {
        let (key, hit) = self.lookup(&request).await?;
        if let Some(hit) = hit {
            return Ok(hit);
        }
        let response = chain.next_call(request).await?;
        if let Some(chat) = response.chat_response() {
            self.cache.set(&key, chat).await?;
        }
        Ok(response)
    }
}

impl StreamAdvisor for ResponseCacheAdvisor {
    /// A hit is replayed as a single element; a miss is cached once fully aggregated.
    fn advise_stream(
        self: Arc<Self>,
        request: ChatClientRequest,
        chain: StreamAdvisorChain,
    ) -> BoxStream<'static, ChatClientResponse> {
        Box::pin(async_stream::try_stream! {
            let (key, hit) = self.lookup(&request).await?;
            if let Some(hit) = hit {
                yield hit;
            } else {
                let mut stream = chain.next_stream(request);
                let mut aggregator = MessageAggregator::new();
                while let Some(item) = stream.next().await {
                    let item = item?;
                    aggregator.add(&item);
                    yield item;
                }
                if let Some(chat) = aggregator.finish().and_then(|r| r.chat_response().cloned()) {
                    self.cache.set(&key, &chat).await?;
                }
            }
        })
    }
}
