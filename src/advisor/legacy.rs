//! Request/response pair of the first-generation advisor API.
//!
//! Kept so that advisors written against the flat request shape can still be plugged
//! into the chain; convert at the boundary with
//! [`AdvisedRequest::from_chat_client_request`] and [`AdvisedRequest::to_chat_client_request`].

use super::request::{AdvisorContext, ChatClientRequest, ChatClientResponse};
use crate::client::PromptTemplate;
use crate::model::ChatModel;
use crate::options::{ChatOptions, DefaultChatOptions};
use crate::tool::ToolCallback;
use crate::types::{ChatResponse, Media, Message, Prompt, UserMessage};
use crate::{Error, ErrorContext, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// User parameter whose value is appended to the user text as format instructions.
pub const FORMAT_PARAM: &str = "formatParam";

fn check_context(context: &AdvisorContext) -> Result<()> {
    if context.values().any(Value::is_null) {
        return Err(Error::validation_with_context(
            "adviseContext values cannot be null",
            ErrorContext::new().with_field_path("advise_context"),
        ));
    }
    Ok(())
}

/// Flat request of the legacy advisor API.
#[derive(Clone)]
pub struct AdvisedRequest {
    chat_model: Arc<dyn ChatModel>,
    user_text: String,
    system_text: Option<String>,
    chat_options: Option<Box<dyn ChatOptions>>,
    media: Vec<Media>,
    tool_names: Vec<String>,
    tool_callbacks: Vec<Arc<dyn ToolCallback>>,
    messages: Vec<Message>,
    user_params: HashMap<String, Value>,
    system_params: HashMap<String, Value>,
    advisor_params: HashMap<String, Value>,
    advise_context: AdvisorContext,
    tool_context: HashMap<String, Value>,
}

impl AdvisedRequest {
    pub fn builder() -> AdvisedRequestBuilder {
        AdvisedRequestBuilder::default()
    }

    /// Split a prompt back into the flat shape: the last user message becomes the user
    /// text, the first system message the system text, everything else stays in `messages`.
    pub fn from_chat_client_request(
        request: &ChatClientRequest,
        chat_model: Arc<dyn ChatModel>,
    ) -> Result<Self> {
        let instructions = request.prompt().instructions();
        let user_idx = instructions.iter().rposition(|m| matches!(m, Message::User(_)));
        let system_idx = instructions.iter().position(|m| matches!(m, Message::System(_)));

        let (user_text, media) = match user_idx.map(|i| &instructions[i]) {
            Some(Message::User(user)) => (user.text.clone(), user.media.clone()),
            _ => (String::new(), Vec::new()),
        };
        let system_text = system_idx.map(|i| instructions[i].text().to_string());
        let messages = instructions
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != user_idx && Some(*i) != system_idx)
            .map(|(_, m)| m.clone())
            .collect::<Vec<_>>();

        let mut builder = AdvisedRequest::builder()
            .chat_model(chat_model)
            .user_text(user_text)
            .media(media)
            .messages(messages)
            .advise_context(request.context().clone());
        if let Some(system_text) = system_text {
            builder = builder.system_text(system_text);
        }
        if let Some(options) = request.prompt().options() {
            builder = builder.chat_options(options.clone_options());
        }
        builder.build()
    }

    pub fn to_chat_client_request(&self) -> Result<ChatClientRequest> {
        let mut context = self.advisor_params.clone();
        context.extend(self.advise_context.clone());
        ChatClientRequest::new(self.to_prompt()?, context)
    }

    /// Messages first, then the rendered system text, then the rendered user text.
    pub fn to_prompt(&self) -> Result<Prompt> {
        let mut messages = self.messages.clone();

        if let Some(system_text) = self.system_text.as_deref().filter(|t| !t.is_empty()) {
            let text = if self.system_params.is_empty() {
                system_text.to_string()
            } else {
                PromptTemplate::new(system_text).render_values(&self.system_params)?
            };
            messages.push(Message::system(text));
        }

        let mut user_text = self.user_text.clone();
        if let Some(format) = self.user_params.get(FORMAT_PARAM) {
            let format = match format {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            user_text = format!("{}\n{}", user_text, format);
        }
        if !self.user_params.is_empty() {
            let mut params = self.user_params.clone();
            params.remove(FORMAT_PARAM);
            user_text = PromptTemplate::new(user_text).render_values(&params)?;
        }
        if !user_text.is_empty() || !self.media.is_empty() {
            messages.push(Message::User(
                UserMessage::new(user_text).with_media(self.media.clone()),
            ));
        }

        let has_tools = !self.tool_names.is_empty()
            || !self.tool_callbacks.is_empty()
            || !self.tool_context.is_empty();
        let options = match (self.chat_options.clone(), has_tools) {
            (options, false) => options,
            (options, true) => {
                let mut options: Box<dyn ChatOptions> =
                    options.unwrap_or_else(|| Box::new(DefaultChatOptions::default()));
                match options.tool_calling_mut() {
                    Some(tools) => {
                        if !self.tool_names.is_empty() {
                            tools.tool_names = self.tool_names.iter().cloned().collect();
                        }
                        if !self.tool_callbacks.is_empty() {
                            tools.tool_callbacks = self.tool_callbacks.clone();
                        }
                        tools.tool_context.extend(self.tool_context.clone());
                    }
                    None => tracing::warn!("chat options do not support tool calling; tools ignored"),
                }
                Some(options)
            }
        };
        Ok(Prompt::with_options(messages, options))
    }

    /// Copy of this request whose context is replaced by `f(context)`.
    pub fn update_context(&self, f: impl FnOnce(AdvisorContext) -> AdvisorContext) -> Result<Self> {
        let context = f(self.advise_context.clone());
        check_context(&context)?;
        let mut updated = self.clone();
        updated.advise_context = context;
        Ok(updated)
    }

    pub fn mutate(&self) -> AdvisedRequestBuilder {
        AdvisedRequestBuilder {
            chat_model: Some(self.chat_model.clone()),
            user_text: Some(self.user_text.clone()),
            system_text: self.system_text.clone(),
            chat_options: self.chat_options.clone(),
            media: self.media.clone(),
            tool_names: self.tool_names.clone(),
            tool_callbacks: self.tool_callbacks.clone(),
            messages: self.messages.clone(),
            user_params: self.user_params.clone(),
            system_params: self.system_params.clone(),
            advisor_params: self.advisor_params.clone(),
            advise_context: self.advise_context.clone(),
            tool_context: self.tool_context.clone(),
        }
    }

    pub fn chat_model(&self) -> &Arc<dyn ChatModel> {
        &self.chat_model
    }

    pub fn user_text(&self) -> &str {
        &self.user_text
    }

    pub fn system_text(&self) -> Option<&str> {
        self.system_text.as_deref()
    }

    pub fn chat_options(&self) -> Option<&dyn ChatOptions> {
        self.chat_options.as_deref()
    }

    pub fn media(&self) -> &[Media] {
        &self.media
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn user_params(&self) -> &HashMap<String, Value> {
        &self.user_params
    }

    pub fn system_params(&self) -> &HashMap<String, Value> {
        &self.system_params
    }

    pub fn advise_context(&self) -> &AdvisorContext {
        &self.advise_context
    }
}

#[derive(Default)]
pub struct AdvisedRequestBuilder {
    chat_model: Option<Arc<dyn ChatModel>>,
    user_text: Option<String>,
    system_text: Option<String>,
    chat_options: Option<Box<dyn ChatOptions>>,
    media: Vec<Media>,
    tool_names: Vec<String>,
    tool_callbacks: Vec<Arc<dyn ToolCallback>>,
    messages: Vec<Message>,
    user_params: HashMap<String, Value>,
    system_params: HashMap<String, Value>,
    advisor_params: HashMap<String, Value>,
    advise_context: AdvisorContext,
    tool_context: HashMap<String, Value>,
}

impl AdvisedRequestBuilder {
    pub fn chat_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.chat_model = Some(model);
        self
    }

    pub fn user_text(mut self, text: impl Into<String>) -> Self {
        self.user_text = Some(text.into());
        self
    }

    pub fn system_text(mut self, text: impl Into<String>) -> Self {
        self.system_text = Some(text.into());
        self
    }

    pub fn chat_options(mut self, options: Box<dyn ChatOptions>) -> Self {
        self.chat_options = Some(options);
        self
    }

    pub fn media(mut self, media: Vec<Media>) -> Self {
        self.media = media;
        self
    }

    pub fn tool_names(mut self, names: Vec<String>) -> Self {
        self.tool_names = names;
        self
    }

    pub fn tool_callbacks(mut self, callbacks: Vec<Arc<dyn ToolCallback>>) -> Self {
        self.tool_callbacks = callbacks;
        self
    }

    pub fn messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    pub fn user_params(mut self, params: HashMap<String, Value>) -> Self {
        self.user_params = params;
        self
    }

    pub fn user_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.user_params.insert(key.into(), value.into());
        self
    }

    pub fn system_params(mut self, params: HashMap<String, Value>) -> Self {
        self.system_params = params;
        self
    }

    pub fn advisor_params(mut self, params: HashMap<String, Value>) -> Self {
        self.advisor_params = params;
        self
    }

    pub fn advise_context(mut self, context: AdvisorContext) -> Self {
        self.advise_context = context;
        self
    }

    pub fn tool_context(mut self, context: HashMap<String, Value>) -> Self {
        self.tool_context = context;
        self
    }

    pub fn build(self) -> Result<AdvisedRequest> {
        let chat_model = self.chat_model.ok_or_else(|| {
            Error::validation_with_context(
                "chatModel cannot be null",
                ErrorContext::new().with_field_path("chat_model"),
            )
        })?;
        let user_text = self.user_text.unwrap_or_default();
        if user_text.trim().is_empty() && self.messages.is_empty() {
            return Err(Error::validation_with_context(
                "userText cannot be null or empty unless messages are provided",
                ErrorContext::new().with_field_path("user_text"),
            ));
        }
        check_context(&self.advise_context)?;
        Ok(AdvisedRequest {
            chat_model,
            user_text,
            system_text: self.system_text,
            chat_options: self.chat_options,
            media: self.media,
            tool_names: self.tool_names,
            tool_callbacks: self.tool_callbacks,
            messages: self.messages,
            user_params: self.user_params,
            system_params: self.system_params,
            advisor_params: self.advisor_params,
            advise_context: self.advise_context,
            tool_context: self.tool_context,
        })
    }
}

/// Response of the legacy advisor API.
#[derive(Debug, Clone)]
pub struct AdvisedResponse {
    response: Option<ChatResponse>,
    advise_context: AdvisorContext,
}

impl AdvisedResponse {
    pub fn new(response: Option<ChatResponse>, advise_context: AdvisorContext) -> Result<Self> {
        check_context(&advise_context)?;
        Ok(Self {
            response,
            advise_context,
        })
    }

    pub fn from_chat_client_response(response: &ChatClientResponse) -> Result<Self> {
        Self::new(response.chat_response().cloned(), response.context().clone())
    }

    pub fn to_chat_client_response(&self) -> Result<ChatClientResponse> {
        ChatClientResponse::new(self.response.clone(), self.advise_context.clone())
    }

    pub fn response(&self) -> Option<&ChatResponse> {
        self.response.as_ref()
    }

    pub fn advise_context(&self) -> &AdvisorContext {
        &self.advise_context
    }

    pub fn update_context(&self, f: impl FnOnce(AdvisorContext) -> AdvisorContext) -> Result<Self> {
        Self::new(self.response.clone(), f(self.advise_context.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AssistantMessage, Generation, MessageType};
    use async_trait::async_trait;
    use serde_json::json;

    struct Unused;

    #[async_trait]
    impl ChatModel for Unused {
        async fn call(&self, _prompt: Prompt) -> Result<ChatResponse> {
            Ok(ChatResponse::default())
        }
    }

    fn model() -> Arc<dyn ChatModel> {
        Arc::new(Unused)
    }

    #[test]
    fn test_user_text_required_unless_messages() {
        let err = AdvisedRequest::builder().chat_model(model()).build().err().unwrap();
        assert!(err
            .to_string()
            .contains("userText cannot be null or empty unless messages are provided"));

        assert!(AdvisedRequest::builder()
            .chat_model(model())
            .messages(vec![Message::user("hi")])
            .build()
            .is_ok());
        assert!(AdvisedRequest::builder().user_text("hi").build().is_err());
    }

    #[test]
    fn test_to_prompt_order_and_format_param() {
        let request = AdvisedRequest::builder()
            .chat_model(model())
            .messages(vec![Message::assistant("earlier")])
            .system_text("You speak {lang}")
            .system_params(HashMap::from([("lang".to_string(), json!("French"))]))
            .user_text("Name a {thing}")
            .user_param("thing", "cheese")
            .user_param(FORMAT_PARAM, "Answer in JSON")
            .build()
            .unwrap();

        let prompt = request.to_prompt().unwrap();
        let types: Vec<MessageType> = prompt.instructions().iter().map(Message::message_type).collect();
        assert_eq!(
            types,
            vec![MessageType::Assistant, MessageType::System, MessageType::User]
        );
        assert_eq!(prompt.system_message().unwrap().text, "You speak French");
        assert_eq!(
            prompt.user_message().unwrap().text,
            "Name a cheese\nAnswer in JSON"
        );
    }

    #[test]
    fn test_round_trip_through_chat_client_request() {
        let prompt = Prompt::new(vec![
            Message::system("sys"),
            Message::user("old question"),
            Message::assistant("old answer"),
            Message::user("new question"),
        ]);
        let mut context = AdvisorContext::new();
        context.insert("k".into(), json!(1));
        let request = ChatClientRequest::new(prompt, context).unwrap();

        let advised = AdvisedRequest::from_chat_client_request(&request, model()).unwrap();
        assert_eq!(advised.user_text(), "new question");
        assert_eq!(advised.system_text(), Some("sys"));
        assert_eq!(advised.messages().len(), 2);
        assert_eq!(advised.advise_context()["k"], json!(1));

        let back = advised.to_chat_client_request().unwrap();
        assert_eq!(back.prompt().user_message().unwrap().text, "new question");
        assert_eq!(back.context()["k"], json!(1));
    }

    #[test]
    fn test_update_context_is_copy_on_write() {
        let request = AdvisedRequest::builder()
            .chat_model(model())
            .user_text("q")
            .build()
            .unwrap();
        let updated = request
            .update_context(|mut ctx| {
                ctx.insert("added".into(), json!(true));
                ctx
            })
            .unwrap();
        assert!(request.advise_context().is_empty());
        assert_eq!(updated.advise_context()["added"], json!(true));

        let rejected = request.update_context(|mut ctx| {
            ctx.insert("bad".into(), Value::Null);
            ctx
        });
        assert!(rejected.err().unwrap().is_validation());
    }

    #[test]
    fn test_advised_response_conversion() {
        let chat = ChatResponse::new(vec![Generation::new(AssistantMessage::new("a"))]);
        let response = ChatClientResponse::new(Some(chat), AdvisorContext::new()).unwrap();
        let advised = AdvisedResponse::from_chat_client_response(&response)
            .unwrap()
            .update_context(|mut ctx| {
                ctx.insert("x".into(), json!("y"));
                ctx
            })
            .unwrap();
        let back = advised.to_chat_client_response().unwrap();
        assert_eq!(back.chat_response().unwrap().result().unwrap().text(), "a");
        assert_eq!(back.context()["x"], json!("y"));
    }
}
