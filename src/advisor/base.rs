use super::chain::{CallAdvisorChain, StreamAdvisorChain};
use super::request::{ChatClientRequest, ChatClientResponse};
use super::{Advisor, CallAdvisor, StreamAdvisor};
use crate::{BoxStream, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

/// Advisor expressed as a pair of request / response rewrites.
///
/// Wrap it in [`BaseAdvisorAdapter`] to get both the call and the stream hooks.
pub trait BaseAdvisor: Advisor {
    fn before(&self, request: ChatClientRequest) -> Result<ChatClientRequest>;

    fn after(&self, response: ChatClientResponse) -> Result<ChatClientResponse>;
}

pub struct BaseAdvisorAdapter<A> {
    inner: Arc<A>,
}

impl<A: BaseAdvisor> BaseAdvisorAdapter<A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

impl<A: BaseAdvisor> Advisor for BaseAdvisorAdapter<A> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn order(&self) -> i32 {
        self.inner.order()
    }
}

#[async_trait]
impl<A: BaseAdvisor + 'static> CallAdvisor for BaseAdvisorAdapter<A> {
    async fn advise_call(
        &self,
        request: ChatClientRequest,
        chain: &CallAdvisorChain,
    ) -> Result<ChatClientResponse> {
        let request = self.inner.before(request)?;
        let response = chain.next_call(request).await?;
        self.inner.after(response)
    }
}

impl<A: BaseAdvisor + 'static> StreamAdvisor for BaseAdvisorAdapter<A> {
    /// `before` runs once; `after` runs on every chunk that carries a finish reason.
    fn advise_stream(
        self: Arc<Self>,
        request: ChatClientRequest,
        chain: StreamAdvisorChain,
    ) -> BoxStream<'static, ChatClientResponse> {
        let request = match self.inner.before(request) {
            Ok(request) => request,
            Err(e) => return Box::pin(futures::stream::once(async move { Err(e) })),
        };
        let inner = self.inner.clone();
        Box::pin(chain.next_stream(request).map(move |item| {
            item.and_then(|response| {
                if has_finish_reason(&response) {
                    inner.after(response)
                } else {
                    Ok(response)
                }
            })
        }))
    }
}

fn has_finish_reason(response: &ChatClientResponse) -> bool {
    response
        .chat_response()
        .map(|r| {
            r.results
                .iter()
                .any(|g| g.finish_reason().map(|f| !f.is_empty()).unwrap_or(false))
        })
        .unwrap_or(false)
}
