use crate::types::{ChatResponse, Prompt};
use crate::{Error, ErrorContext, Result};
use serde_json::Value;
use std::collections::HashMap;

/// Per-request key/value map advisors use to talk to each other.
pub type AdvisorContext = HashMap<String, Value>;

fn validate_context(context: &AdvisorContext) -> Result<()> {
    for (key, value) in context {
        if key.is_empty() {
            return Err(Error::validation_with_context(
                "context keys cannot be null",
                ErrorContext::new().with_field_path("context"),
            ));
        }
        if value.is_null() {
            return Err(Error::validation_with_context(
                "context values cannot be null",
                ErrorContext::new().with_field_path(format!("context.{}", key)),
            ));
        }
    }
    Ok(())
}

/// A prompt travelling through the advisor chain together with its context.
///
/// Values are immutable: [`ChatClientRequest::copy`] and [`ChatClientRequest::mutate`]
/// clone the context so a derived request never aliases the original map.
#[derive(Debug, Clone)]
pub struct ChatClientRequest {
    prompt: Prompt,
    context: AdvisorContext,
}

impl ChatClientRequest {
    pub fn new(prompt: Prompt, context: AdvisorContext) -> Result<Self> {
        validate_context(&context)?;
        Ok(Self { prompt, context })
    }

    pub fn builder() -> ChatClientRequestBuilder {
        ChatClientRequestBuilder::default()
    }

    pub fn prompt(&self) -> &Prompt {
        &self.prompt
    }

    pub fn context(&self) -> &AdvisorContext {
        &self.context
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn mutate(&self) -> ChatClientRequestBuilder {
        ChatClientRequestBuilder {
            prompt: Some(self.prompt.clone()),
            context: self.context.clone(),
        }
    }

    pub fn into_parts(self) -> (Prompt, AdvisorContext) {
        (self.prompt, self.context)
    }
}

#[derive(Debug, Default)]
pub struct ChatClientRequestBuilder {
    prompt: Option<Prompt>,
    context: AdvisorContext,
}

impl ChatClientRequestBuilder {
    pub fn prompt(mut self, prompt: Prompt) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Replace the whole context.
    pub fn context(mut self, context: AdvisorContext) -> Self {
        self.context = context;
        self
    }

    pub fn context_entry(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn context_entries(mut self, entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        self.context.extend(entries);
        self
    }

    pub fn build(self) -> Result<ChatClientRequest> {
        let prompt = self
            .prompt
            .ok_or_else(|| Error::validation("prompt cannot be null"))?;
        ChatClientRequest::new(prompt, self.context)
    }
}

/// A model response travelling back out through the advisor chain.
#[derive(Debug, Clone, Default)]
pub struct ChatClientResponse {
    chat_response: Option<ChatResponse>,
    context: AdvisorContext,
}

impl ChatClientResponse {
    pub fn new(chat_response: Option<ChatResponse>, context: AdvisorContext) -> Result<Self> {
        validate_context(&context)?;
        Ok(Self {
            chat_response,
            context,
        })
    }

    pub fn builder() -> ChatClientResponseBuilder {
        ChatClientResponseBuilder::default()
    }

    pub fn chat_response(&self) -> Option<&ChatResponse> {
        self.chat_response.as_ref()
    }

    pub fn context(&self) -> &AdvisorContext {
        &self.context
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn mutate(&self) -> ChatClientResponseBuilder {
        ChatClientResponseBuilder {
            chat_response: self.chat_response.clone(),
            context: self.context.clone(),
        }
    }

    pub fn into_parts(self) -> (Option<ChatResponse>, AdvisorContext) {
        (self.chat_response, self.context)
    }
}

#[derive(Debug, Default)]
pub struct ChatClientResponseBuilder {
    chat_response: Option<ChatResponse>,
    context: AdvisorContext,
}

impl ChatClientResponseBuilder {
    pub fn chat_response(mut self, chat_response: Option<ChatResponse>) -> Self {
        self.chat_response = chat_response;
        self
    }

    pub fn context(mut self, context: AdvisorContext) -> Self {
        self.context = context;
        self
    }

    pub fn context_entry(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<ChatClientResponse> {
        ChatClientResponse::new(self.chat_response, self.context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> ChatClientRequest {
        ChatClientRequest::builder()
            .prompt(Prompt::from_text("hi"))
            .context_entry("key", "original")
            .build()
            .unwrap()
    }

    #[test]
    fn test_mutate_does_not_alias_context() {
        let original = request();
        let derived = original
            .mutate()
            .context_entry("key", "changed")
            .context_entry("extra", 1)
            .build()
            .unwrap();
        assert_eq!(original.context()["key"], json!("original"));
        assert!(!original.context().contains_key("extra"));
        assert_eq!(derived.context()["key"], json!("changed"));
    }

    #[test]
    fn test_copy_does_not_alias_context() {
        let original = request();
        let (_, mut context) = original.copy().into_parts();
        context.insert("key".into(), json!("changed"));
        assert_eq!(original.context()["key"], json!("original"));
    }

    #[test]
    fn test_null_values_and_empty_keys_are_rejected() {
        let err = ChatClientRequest::builder()
            .prompt(Prompt::from_text("hi"))
            .context_entry("k", Value::Null)
            .build()
            .unwrap_err();
        assert!(err.is_validation());

        let err = ChatClientResponse::builder()
            .context_entry("", 1)
            .build()
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_prompt_is_required() {
        assert!(ChatClientRequest::builder().build().is_err());
    }
}
