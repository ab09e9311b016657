use super::chain::{CallAdvisorChain, StreamAdvisorChain};
use super::request::{ChatClientRequest, ChatClientResponse};
use super::{Advisor, CallAdvisor, StreamAdvisor};
use crate::client::PromptTemplate;
use crate::types::{Document, Prompt};
use crate::vectorstore::filter::Expression;
use crate::vectorstore::{SearchRequest, VectorStore};
use crate::{BoxStream, Error, ErrorContext, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Context key under which the retrieved documents are stored (as JSON).
pub const RETRIEVED_DOCUMENTS: &str = "qa_retrieved_documents";

/// Context key overriding the search filter for one request.
///
/// The value is a serialized [`Expression`]; the boolean `false` disables filtering.
pub const FILTER_EXPRESSION: &str = "qa_filter_expression";

const DEFAULT_USER_TEXT_ADVISE: &str = "{query}

Context information is below, surrounded by ---------------------

---------------------
{question_answer_context}
---------------------

Given the context and provided history information and not prior knowledge,
reply to the user comment. If the answer is not in the context, inform
the user that you can't answer the question.
";

/// Retrieval-augmented generation over a [`VectorStore`].
///
/// Before the call the user message is used as the search query; the matching documents
/// are rendered into the user message and stored in the context under
/// [`RETRIEVED_DOCUMENTS`].
pub struct QuestionAnswerAdvisor {
    store: Arc<dyn VectorStore>,
    search: SearchRequest,
    template: PromptTemplate,
    order: i32,
}

impl QuestionAnswerAdvisor {
    pub const DEFAULT_ORDER: i32 = 0;

    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self {
            store,
            search: SearchRequest::default(),
            template: PromptTemplate::new(DEFAULT_USER_TEXT_ADVISE),
            order: Self::DEFAULT_ORDER,
        }
    }

    /// Template used for `top_k`, threshold and filter; its query is replaced per request.
    pub fn with_search_request(mut self, search: SearchRequest) -> Self {
        self.search = search;
        self
    }

    pub fn with_filter(mut self, filter: Expression) -> Self {
        self.search.filter_expression = Some(filter);
        self
    }

    /// Must contain the `{query}` and `{question_answer_context}` placeholders.
    pub fn with_template(mut self, template: impl Into<String>) -> Result<Self> {
        let template = PromptTemplate::new(template);
        for placeholder in ["query", "question_answer_context"] {
            if !template.variables().iter().any(|v| v == placeholder) {
                return Err(Error::validation_with_context(
                    format!("The prompt template must contain the {{{}}} placeholder", placeholder),
                    ErrorContext::new().with_field_path("template"),
                ));
            }
        }
        self.template = template;
        Ok(self)
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    async fn before(&self, request: ChatClientRequest) -> Result<ChatClientRequest> {
        let query = request
            .prompt()
            .user_message()
            .map(|u| u.text.clone())
            .unwrap_or_default();

        let mut builder = self.search.mutate().query(query.clone());
        match request.context().get(FILTER_EXPRESSION) {
            Some(Value::Bool(false)) => builder = builder.filter_expression(None),
            Some(value) => {
                let expression: Expression = serde_json::from_value(value.clone())?;
                builder = builder.filter_expression(Some(expression));
            }
            None => {}
        }
        let documents = self.store.similarity_search(&builder.build()?).await?;
        tracing::debug!(count = documents.len(), "retrieved documents");

        let context_text = documents
            .iter()
            .filter_map(Document::text)
            .collect::<Vec<_>>()
            .join(&line_separator());
        let mut params = HashMap::new();
        params.insert("query".to_string(), query);
        params.insert("question_answer_context".to_string(), context_text);
        let augmented_text = self.template.render(&params)?;

        let prompt: Prompt = request
            .prompt()
            .augment_user_message(|user| user.clone().with_text(augmented_text));
        request
            .mutate()
            .prompt(prompt)
            .context_entry(RETRIEVED_DOCUMENTS, serde_json::to_value(&documents)?)
            .build()
    }

    fn after(&self, response: ChatClientResponse, documents: &Value) -> Result<ChatClientResponse> {
        let Some(chat) = response.chat_response() else {
            return Ok(response);
        };
        let mut chat = chat.clone();
        chat.metadata
            .extra
            .insert(RETRIEVED_DOCUMENTS.to_string(), documents.clone());
        response.mutate().chat_response(Some(chat)).build()
    }
}

fn line_separator() -> String {
    if cfg!(windows) { "\r\n" } else { "\n" }.to_string()
}

impl Advisor for QuestionAnswerAdvisor {
    fn name(&self) -> &str {
        "QuestionAnswerAdvisor"
    }

    fn order(&self) -> i32 {
        self.order
    }
}

#[async_trait]
impl CallAdvisor for QuestionAnswerAdvisor {
    async fn advise_call(
        &self,
        request: ChatClientRequest,
        chain: &CallAdvisorChain,
    ) -> Result<ChatClientResponse> {
        let request = self.before(request).await?;
        let documents = request.context()[RETRIEVED_DOCUMENTS].clone();
        let response = chain.next_call(request).await?;
        self.after(response, &documents)
    }
}

impl StreamAdvisor for QuestionAnswerAdvisor {
    /// Documents are attached to the chunk carrying the finish reason.
    fn advise_stream(
        self: Arc<Self>,
        request: ChatClientRequest,
        chain: StreamAdvisorChain,
    ) -> BoxStream<'static, ChatClientResponse> {
        Box::pin(async_stream::try_stream! {
            let request = self.before(request).await?;
            let documents = request.context()[RETRIEVED_DOCUMENTS].clone();
            let mut stream = chain.next_stream(request);
            while let Some(item) = stream.next().await {
                let item = item?;
                let finished = item
                    .chat_response()
                    .and_then(|c| c.result())
                    .and_then(|g| g.finish_reason())
                    .is_some_and(|f| !f.is_empty());
                if finished {
                    yield self.after(item, &documents)?;
                } else {
                    yield item;
                }
            }
        })
    }
}
