use super::chat::ChatClientRequestSpec;
use super::converter::BeanOutputConverter;
use crate::advisor::{AdvisorChainBuilder, ChatClientRequest, ChatClientResponse};
use crate::tool::RETURN_DIRECT_FINISH_REASON;
use crate::types::{ChatResponse, Prompt};
use crate::{BoxStream, Result};
use futures::StreamExt;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Context key carrying the format instructions of an entity request.
pub const OUTPUT_FORMAT: &str = "chat_client_output_format";

/// A converted entity together with the response it came from.
#[derive(Debug, Clone)]
pub struct ResponseEntity<T> {
    pub response: Option<ChatResponse>,
    pub entity: Option<T>,
}

/// Text of a response.
///
/// When every generation ended with the return-direct finish reason the texts are joined
/// with a newline (one per executed tool); otherwise the first generation wins.
pub fn content_of(response: &ChatResponse) -> Option<String> {
    let first = response.result()?;
    let all_direct = response
        .results
        .iter()
        .all(|g| g.finish_reason() == Some(RETURN_DIRECT_FINISH_REASON));
    if all_direct {
        let texts: Vec<&str> = response.results.iter().map(|g| g.text()).collect();
        return Some(texts.join("\n"));
    }
    Some(first.text().to_string())
}

/// Terminal operations of a synchronous request. Each consumes the spec and runs the
/// advisor chain once.
pub struct CallResponseSpec {
    spec: ChatClientRequestSpec,
}

impl CallResponseSpec {
    pub(crate) fn new(spec: ChatClientRequestSpec) -> Self {
        Self { spec }
    }

    async fn execute(&self, request: ChatClientRequest) -> Result<ChatClientResponse> {
        let chain = AdvisorChainBuilder::new()
            .extend(self.spec.advisor_handles().iter().cloned())
            .build_call_chain(self.spec.model.clone());
        tracing::debug!(advisors = ?chain.remaining(), "executing chat client call");
        chain.next_call(request).await
    }

    pub async fn chat_client_response(self) -> Result<ChatClientResponse> {
        let request = self.spec.to_request()?;
        self.execute(request).await
    }

    pub async fn chat_response(self) -> Result<Option<ChatResponse>> {
        let response = self.chat_client_response().await?;
        Ok(response.into_parts().0)
    }

    pub async fn content(self) -> Result<Option<String>> {
        let response = self.chat_response().await?;
        Ok(response.as_ref().and_then(content_of))
    }

    /// Ask for JSON matching `T`'s schema and convert the answer.
    pub async fn entity<T: JsonSchema + DeserializeOwned>(self) -> Result<Option<T>> {
        Ok(self.response_entity::<T>().await?.entity)
    }

    pub async fn response_entity<T: JsonSchema + DeserializeOwned>(self) -> Result<ResponseEntity<T>> {
        let converter = BeanOutputConverter::<T>::new();
        let format = converter.format();
        let request = self.spec.to_request()?;
        let prompt = request
            .prompt()
            .augment_user_message(|u| u.clone().with_text(format!("{}\n{}", u.text, format)));
        let prompt = with_output_schema(prompt, converter.json_schema());
        let request = request
            .mutate()
            .prompt(prompt)
            .context_entry(OUTPUT_FORMAT, format)
            .build()?;

        let response = self.execute(request).await?.into_parts().0;
        let entity = match response.as_ref().and_then(content_of) {
            Some(text) if !text.is_empty() => Some(converter.convert(&text)?),
            _ => None,
        };
        Ok(ResponseEntity { response, entity })
    }
}

/// Sets the schema on options that support structured output and carry none yet.
fn with_output_schema(prompt: Prompt, schema: &Value) -> Prompt {
    let mut options = match prompt.options() {
        Some(options) => options.clone_options(),
        None => return prompt,
    };
    match options.structured_output_mut() {
        Some(structured) if structured.output_schema.is_none() => {
            structured.output_schema = Some(schema.clone());
        }
        _ => return prompt,
    }
    prompt.mutate().options(options).build()
}

/// Terminal operations of a streamed request.
pub struct StreamResponseSpec {
    spec: ChatClientRequestSpec,
}

impl StreamResponseSpec {
    pub(crate) fn new(spec: ChatClientRequestSpec) -> Self {
        Self { spec }
    }

    pub fn chat_client_response(self) -> BoxStream<'static, ChatClientResponse> {
        let request = match self.spec.to_request() {
            Ok(request) => request,
            Err(e) => return Box::pin(futures::stream::once(async move { Err(e) })),
        };
        let chain = AdvisorChainBuilder::new()
            .extend(self.spec.advisor_handles().iter().cloned())
            .build_stream_chain(self.spec.model.clone());
        chain.next_stream(request)
    }

    pub fn chat_response(self) -> BoxStream<'static, ChatResponse> {
        Box::pin(self.chat_client_response().filter_map(|item| async move {
            match item {
                Ok(response) => response.into_parts().0.map(Ok),
                Err(e) => Some(Err(e)),
            }
        }))
    }

    /// Chunk texts; empty chunks are dropped.
    pub fn content(self) -> BoxStream<'static, String> {
        Box::pin(self.chat_response().filter_map(|item| async move {
            match item {
                Ok(chat) => chat
                    .result()
                    .map(|g| g.text().to_string())
                    .filter(|t| !t.is_empty())
                    .map(Ok),
                Err(e) => Some(Err(e)),
            }
        }))
    }
}
