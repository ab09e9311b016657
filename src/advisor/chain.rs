use super::request::{ChatClientRequest, ChatClientResponse};
use super::{Advisor, CallAdvisor, StreamAdvisor, LOWEST_PRECEDENCE};
use crate::model::ChatModel;
use crate::{BoxStream, Error, ErrorContext, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

/// An advisor registration, carrying whichever hooks the advisor implements.
#[derive(Clone)]
pub struct AdvisorHandle {
    name: String,
    order: i32,
    call: Option<Arc<dyn CallAdvisor>>,
    stream: Option<Arc<dyn StreamAdvisor>>,
}

impl AdvisorHandle {
    pub fn call<A: CallAdvisor + 'static>(advisor: A) -> Self {
        Self::call_arc(Arc::new(advisor))
    }

    pub fn call_arc<A: CallAdvisor + 'static>(advisor: Arc<A>) -> Self {
        Self {
            name: advisor.name().to_string(),
            order: advisor.order(),
            call: Some(advisor as Arc<dyn CallAdvisor>),
            stream: None,
        }
    }

    pub fn stream<A: StreamAdvisor + 'static>(advisor: A) -> Self {
        let advisor = Arc::new(advisor);
        Self {
            name: advisor.name().to_string(),
            order: advisor.order(),
            call: None,
            stream: Some(advisor as Arc<dyn StreamAdvisor>),
        }
    }

    /// Register an advisor that intercepts both calls and streams.
    pub fn both<A: CallAdvisor + StreamAdvisor + 'static>(advisor: A) -> Self {
        Self::both_arc(Arc::new(advisor))
    }

    pub fn both_arc<A: CallAdvisor + StreamAdvisor + 'static>(advisor: Arc<A>) -> Self {
        Self {
            name: Advisor::name(advisor.as_ref()).to_string(),
            order: Advisor::order(advisor.as_ref()),
            call: Some(advisor.clone() as Arc<dyn CallAdvisor>),
            stream: Some(advisor as Arc<dyn StreamAdvisor>),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn order(&self) -> i32 {
        self.order
    }
}

impl std::fmt::Debug for AdvisorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdvisorHandle")
            .field("name", &self.name)
            .field("order", &self.order)
            .field("call", &self.call.is_some())
            .field("stream", &self.stream.is_some())
            .finish()
    }
}

/// Cursor over the remaining call advisors.
///
/// `next_call` never moves this cursor; it hands the next advisor a cursor positioned one
/// further, so an advisor may invoke the rest of the chain any number of times.
#[derive(Clone)]
pub struct CallAdvisorChain {
    advisors: Arc<[Arc<dyn CallAdvisor>]>,
    index: usize,
}

impl CallAdvisorChain {
    pub async fn next_call(&self, request: ChatClientRequest) -> Result<ChatClientResponse> {
        let advisor = self.advisors.get(self.index).ok_or_else(|| {
            Error::runtime_with_context(
                "No CallAdvisors available to execute",
                ErrorContext::new().with_source("advisor_chain"),
            )
        })?;
        tracing::trace!(advisor = advisor.name(), "advise call");
        let next = CallAdvisorChain {
            advisors: self.advisors.clone(),
            index: self.index + 1,
        };
        advisor.advise_call(request, &next).await
    }

    /// Advisors not yet invoked, in execution order.
    pub fn remaining(&self) -> Vec<&str> {
        self.advisors[self.index.min(self.advisors.len())..]
            .iter()
            .map(|a| a.name())
            .collect()
    }

    /// A chain positioned right after the advisor called `name`.
    pub fn copy_after(&self, name: &str) -> Result<CallAdvisorChain> {
        let pos = self
            .advisors
            .iter()
            .position(|a| a.name() == name)
            .ok_or_else(|| {
                Error::validation(format!("The advisor '{}' is not part of the chain", name))
            })?;
        Ok(CallAdvisorChain {
            advisors: self.advisors.clone(),
            index: pos + 1,
        })
    }
}

/// Cursor over the remaining stream advisors.
#[derive(Clone)]
pub struct StreamAdvisorChain {
    advisors: Arc<[Arc<dyn StreamAdvisor>]>,
    index: usize,
}

impl StreamAdvisorChain {
    pub fn next_stream(&self, request: ChatClientRequest) -> BoxStream<'static, ChatClientResponse> {
        let Some(advisor) = self.advisors.get(self.index) else {
            return Box::pin(futures::stream::once(async {
                Err(Error::runtime_with_context(
                    "No StreamAdvisors available to execute",
                    ErrorContext::new().with_source("advisor_chain"),
                ))
            }));
        };
        tracing::trace!(advisor = advisor.name(), "advise stream");
        let next = StreamAdvisorChain {
            advisors: self.advisors.clone(),
            index: self.index + 1,
        };
        advisor.clone().advise_stream(request, next)
    }

    pub fn remaining(&self) -> Vec<&str> {
        self.advisors[self.index.min(self.advisors.len())..]
            .iter()
            .map(|a| a.name())
            .collect()
    }

    pub fn copy_after(&self, name: &str) -> Result<StreamAdvisorChain> {
        let pos = self
            .advisors
            .iter()
            .position(|a| a.name() == name)
            .ok_or_else(|| {
                Error::validation(format!("The advisor '{}' is not part of the chain", name))
            })?;
        Ok(StreamAdvisorChain {
            advisors: self.advisors.clone(),
            index: pos + 1,
        })
    }
}

/// Orders advisors and closes both chains with the model-invoking terminals.
#[derive(Default)]
pub struct AdvisorChainBuilder {
    handles: Vec<AdvisorHandle>,
}

impl AdvisorChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, handle: AdvisorHandle) -> Self {
        self.handles.push(handle);
        self
    }

    pub fn extend(mut self, handles: impl IntoIterator<Item = AdvisorHandle>) -> Self {
        self.handles.extend(handles);
        self
    }

    fn sorted(&self) -> Vec<AdvisorHandle> {
        let mut handles = self.handles.clone();
        // stable: equal orders keep registration order
        handles.sort_by_key(|h| h.order);
        handles
    }

    pub fn build_call_chain(&self, model: Arc<dyn ChatModel>) -> CallAdvisorChain {
        let mut advisors: Vec<Arc<dyn CallAdvisor>> =
            self.sorted().into_iter().filter_map(|h| h.call).collect();
        advisors.push(Arc::new(ChatModelCallAdvisor::new(model)));
        CallAdvisorChain {
            advisors: advisors.into(),
            index: 0,
        }
    }

    pub fn build_stream_chain(&self, model: Arc<dyn ChatModel>) -> StreamAdvisorChain {
        let mut advisors: Vec<Arc<dyn StreamAdvisor>> =
            self.sorted().into_iter().filter_map(|h| h.stream).collect();
        advisors.push(Arc::new(ChatModelStreamAdvisor::new(model)));
        StreamAdvisorChain {
            advisors: advisors.into(),
            index: 0,
        }
    }
}

/// Terminal call advisor: hands the prompt to the model.
pub struct ChatModelCallAdvisor {
    model: Arc<dyn ChatModel>,
}

impl ChatModelCallAdvisor {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

impl Advisor for ChatModelCallAdvisor {
    fn name(&self) -> &str {
        "call"
    }

    fn order(&self) -> i32 {
        LOWEST_PRECEDENCE
    }
}

#[async_trait]
impl CallAdvisor for ChatModelCallAdvisor {
    async fn advise_call(
        &self,
        request: ChatClientRequest,
        _chain: &CallAdvisorChain,
    ) -> Result<ChatClientResponse> {
        let (prompt, context) = request.into_parts();
        let response = self.model.call(prompt).await?;
        ChatClientResponse::new(Some(response), context)
    }
}

/// Terminal stream advisor: streams from the model, one response per chunk.
pub struct ChatModelStreamAdvisor {
    model: Arc<dyn ChatModel>,
}

impl ChatModelStreamAdvisor {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

impl Advisor for ChatModelStreamAdvisor {
    fn name(&self) -> &str {
        "stream"
    }

    fn order(&self) -> i32 {
        LOWEST_PRECEDENCE
    }
}

impl StreamAdvisor for ChatModelStreamAdvisor {
    fn advise_stream(
        self: Arc<Self>,
        request: ChatClientRequest,
        _chain: StreamAdvisorChain,
    ) -> BoxStream<'static, ChatClientResponse> {
        let (prompt, context) = request.into_parts();
        let stream = self.model.clone().stream(prompt).map(move |chunk| {
            chunk.and_then(|response| ChatClientResponse::new(Some(response), context.clone()))
        });
        Box::pin(stream)
    }
}
