use super::aggregator::MessageAggregator;
use super::chain::{CallAdvisorChain, StreamAdvisorChain};
use super::request::{ChatClientRequest, ChatClientResponse};
use super::{Advisor, CallAdvisor, StreamAdvisor};
use crate::{BoxStream, Result};
use async_trait::async_trait;
use std::sync::Arc;

type Formatter<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

/// Logs each request and the final response at `debug` level.
#[derive(Clone)]
pub struct SimpleLoggerAdvisor {
    order: i32,
    request_to_string: Formatter<ChatClientRequest>,
    response_to_string: Formatter<ChatClientResponse>,
}

impl Default for SimpleLoggerAdvisor {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SimpleLoggerAdvisor {
    pub fn new(order: i32) -> Self {
        Self {
            order,
            request_to_string: Arc::new(|r: &ChatClientRequest| format!("{:?}", r)),
            response_to_string: Arc::new(|r: &ChatClientResponse| match r.chat_response() {
                Some(chat) => serde_json::to_string(chat).unwrap_or_default(),
                None => "null".to_string(),
            }),
        }
    }

    pub fn with_request_formatter(
        mut self,
        f: impl Fn(&ChatClientRequest) -> String + Send + Sync + 'static,
    ) -> Self {
        self.request_to_string = Arc::new(f);
        self
    }

    pub fn with_response_formatter(
        mut self,
        f: impl Fn(&ChatClientResponse) -> String + Send + Sync + 'static,
    ) -> Self {
        self.response_to_string = Arc::new(f);
        self
    }

    fn log_request(&self, request: &ChatClientRequest) {
        let text = (self.request_to_string)(request);
        tracing::debug!(request = %text, "advised request");
    }

    fn log_response(&self, response: &ChatClientResponse) {
        let text = (self.response_to_string)(response);
        tracing::debug!(response = %text, "advised response");
    }
}

impl Advisor for SimpleLoggerAdvisor {
    fn name(&self) -> &str {
        "SimpleLoggerAdvisor"
    }

    fn order(&self) -> i32 {
        self.order
    }
}

#[async_trait]
impl CallAdvisor for SimpleLoggerAdvisor {
    async fn advise_call(
        &self,
        request: ChatClientRequest,
        chain: &CallAdvisorChain,
    ) -> Result<ChatClientResponse> {
        self.log_request(&request);
        let response = chain.next_call(request).await?;
        self.log_response(&response);
        Ok(response)
    }
}

impl StreamAdvisor for SimpleLoggerAdvisor {
    fn advise_stream(
        self: Arc<Self>,
        request: ChatClientRequest,
        chain: StreamAdvisorChain,
    ) -> BoxStream<'static, ChatClientResponse> {
        self.log_request(&request);
        let stream = chain.next_stream(request);
        MessageAggregator::aggregate(stream, move |aggregated| self.log_response(&aggregated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::{AdvisorChainBuilder, AdvisorContext, AdvisorHandle};
    use crate::model::ChatModel;
    use crate::types::{AssistantMessage, ChatResponse, Generation, Prompt};
    use futures::StreamExt;
    use std::sync::Mutex;

    struct Fixed;

    #[async_trait]
    impl ChatModel for Fixed {
        async fn call(&self, _prompt: Prompt) -> Result<ChatResponse> {
            Ok(ChatResponse::new(vec![Generation::new(AssistantMessage::new("ok"))]))
        }
    }

    #[tokio::test]
    async fn test_formatters_see_request_and_aggregated_response() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (req_log, resp_log) = (seen.clone(), seen.clone());
        let advisor = SimpleLoggerAdvisor::default()
            .with_request_formatter(move |r| {
                req_log.lock().unwrap().push(format!("req:{}", r.prompt().contents()));
                String::new()
            })
            .with_response_formatter(move |r| {
                let text = r.chat_response().unwrap().result().unwrap().text().to_string();
                resp_log.lock().unwrap().push(format!("resp:{}", text));
                String::new()
            });

        let chain = AdvisorChainBuilder::new()
            .push(AdvisorHandle::both(advisor))
            .build_stream_chain(Arc::new(Fixed));
        let request = ChatClientRequest::new(Prompt::from_text("hi"), AdvisorContext::new()).unwrap();
        let _: Vec<_> = chain.next_stream(request).collect().await;

        assert_eq!(*seen.lock().unwrap(), vec!["req:hi", "resp:ok"]);
    }
}
