use super::response::{CallResponseSpec, StreamResponseSpec};
use super::template::PromptTemplate;
use crate::advisor::{AdvisorContext, AdvisorHandle, ChatClientRequest};
use crate::model::ChatModel;
use crate::options::{merge_options, ChatOptions, DefaultChatOptions};
use crate::tool::ToolCallback;
use crate::types::{Media, Message, Prompt, UserMessage};
use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// System text and its template parameters.
#[derive(Debug, Clone, Default)]
pub struct PromptSystemSpec {
    text: Option<String>,
    params: HashMap<String, Value>,
}

impl PromptSystemSpec {
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn params(mut self, params: HashMap<String, Value>) -> Self {
        self.params.extend(params);
        self
    }
}

/// User text, its template parameters and attached media.
#[derive(Debug, Clone, Default)]
pub struct PromptUserSpec {
    text: Option<String>,
    params: HashMap<String, Value>,
    media: Vec<Media>,
}

impl PromptUserSpec {
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn params(mut self, params: HashMap<String, Value>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn media(mut self, media: impl IntoIterator<Item = Media>) -> Self {
        self.media.extend(media);
        self
    }
}

/// Advisors plus the parameters they read from the request context.
#[derive(Debug, Clone, Default)]
pub struct AdvisorSpec {
    advisors: Vec<AdvisorHandle>,
    params: AdvisorContext,
}

impl AdvisorSpec {
    pub fn advisor(mut self, advisor: AdvisorHandle) -> Self {
        self.advisors.push(advisor);
        self
    }

    pub fn advisors(mut self, advisors: impl IntoIterator<Item = AdvisorHandle>) -> Self {
        self.advisors.extend(advisors);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn params(mut self, params: AdvisorContext) -> Self {
        self.params.extend(params);
        self
    }
}

/// One request being assembled, seeded with the client's defaults.
///
/// Nothing is sent until [`call`](Self::call) or [`stream`](Self::stream) is consumed.
#[derive(Clone)]
pub struct ChatClientRequestSpec {
    pub(crate) model: Arc<dyn ChatModel>,
    pub(crate) system: PromptSystemSpec,
    pub(crate) user: PromptUserSpec,
    pub(crate) developer: Option<String>,
    pub(crate) messages: Vec<Message>,
    pub(crate) default_options: Option<Box<dyn ChatOptions>>,
    pub(crate) options: Option<Box<dyn ChatOptions>>,
    pub(crate) tool_names: Vec<String>,
    pub(crate) tool_callbacks: Vec<Arc<dyn ToolCallback>>,
    pub(crate) tool_context: HashMap<String, Value>,
    pub(crate) advisors: AdvisorSpec,
}

impl ChatClientRequestSpec {
    pub(crate) fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            system: PromptSystemSpec::default(),
            user: PromptUserSpec::default(),
            developer: None,
            messages: Vec::new(),
            default_options: None,
            options: None,
            tool_names: Vec::new(),
            tool_callbacks: Vec::new(),
            tool_context: HashMap::new(),
            advisors: AdvisorSpec::default(),
        }
    }

    pub fn system(mut self, text: impl Into<String>) -> Self {
        self.system.text = Some(text.into());
        self
    }

    pub fn system_with(mut self, f: impl FnOnce(PromptSystemSpec) -> PromptSystemSpec) -> Self {
        self.system = f(self.system);
        self
    }

    pub fn user(mut self, text: impl Into<String>) -> Self {
        self.user.text = Some(text.into());
        self
    }

    pub fn user_with(mut self, f: impl FnOnce(PromptUserSpec) -> PromptUserSpec) -> Self {
        self.user = f(self.user);
        self
    }

    pub fn developer(mut self, text: impl Into<String>) -> Self {
        self.developer = Some(text.into());
        self
    }

    pub fn messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    /// Per-request options, merged over the client defaults.
    pub fn options(mut self, options: impl ChatOptions + 'static) -> Self {
        self.options = Some(Box::new(options));
        self
    }

    pub fn tool_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tool_names.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn tool_callbacks(mut self, callbacks: impl IntoIterator<Item = Arc<dyn ToolCallback>>) -> Self {
        self.tool_callbacks.extend(callbacks);
        self
    }

    pub fn tool_context(mut self, context: HashMap<String, Value>) -> Self {
        self.tool_context.extend(context);
        self
    }

    pub fn advisors(mut self, f: impl FnOnce(AdvisorSpec) -> AdvisorSpec) -> Self {
        self.advisors = f(self.advisors);
        self
    }

    pub fn advisor(mut self, advisor: AdvisorHandle) -> Self {
        self.advisors.advisors.push(advisor);
        self
    }

    pub fn call(self) -> CallResponseSpec {
        CallResponseSpec::new(self)
    }

    pub fn stream(self) -> StreamResponseSpec {
        StreamResponseSpec::new(self)
    }

    /// Assemble the prompt: system text, explicit messages, developer text, then user text.
    pub fn to_prompt(&self) -> Result<Prompt> {
        let mut messages = Vec::with_capacity(self.messages.len() + 3);

        if let Some(text) = self.system.text.as_deref().filter(|t| !t.is_empty()) {
            messages.push(Message::system(render(text, &self.system.params)?));
        }
        messages.extend(self.messages.iter().cloned());
        if let Some(text) = self.developer.as_deref().filter(|t| !t.is_empty()) {
            messages.push(Message::developer(text));
        }
        let user_text = match self.user.text.as_deref().filter(|t| !t.is_empty()) {
            Some(text) => Some(render(text, &self.user.params)?),
            None => None,
        };
        if user_text.is_some() || !self.user.media.is_empty() {
            let user = UserMessage::new(user_text.unwrap_or_default()).with_media(self.user.media.clone());
            messages.push(Message::User(user));
        }

        Ok(Prompt::with_options(messages, self.merged_options()))
    }

    fn merged_options(&self) -> Option<Box<dyn ChatOptions>> {
        let options = merge_options(self.default_options.as_deref(), self.options.as_deref());
        let has_tools = !self.tool_names.is_empty()
            || !self.tool_callbacks.is_empty()
            || !self.tool_context.is_empty();
        if !has_tools {
            return options;
        }
        let mut options: Box<dyn ChatOptions> =
            options.unwrap_or_else(|| Box::new(DefaultChatOptions::default()));
        if let Some(tools) = options.tool_calling_mut() {
            if !self.tool_names.is_empty() {
                tools.tool_names = self.tool_names.iter().cloned().collect();
            }
            if !self.tool_callbacks.is_empty() {
                tools.tool_callbacks = self.tool_callbacks.clone();
            }
            tools
                .tool_context
                .extend(self.tool_context.iter().map(|(k, v)| (k.clone(), v.clone())));
        } else {
            tracing::warn!("chat options do not support tool calling; tools ignored");
        }
        Some(options)
    }

    pub(crate) fn to_request(&self) -> Result<ChatClientRequest> {
        ChatClientRequest::new(self.to_prompt()?, self.advisors.params.clone())
    }

    pub(crate) fn advisor_handles(&self) -> &[AdvisorHandle] {
        &self.advisors.advisors
    }
}

/// Templates are only rendered when parameters were supplied.
fn render(text: &str, params: &HashMap<String, Value>) -> Result<String> {
    if params.is_empty() {
        return Ok(text.to_string());
    }
    PromptTemplate::new(text).render_values(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatResponse, MessageType};
    use async_trait::async_trait;

    struct Unused;

    #[async_trait]
    impl ChatModel for Unused {
        async fn call(&self, _prompt: Prompt) -> Result<ChatResponse> {
            Ok(ChatResponse::default())
        }
    }

    fn spec() -> ChatClientRequestSpec {
        ChatClientRequestSpec::new(Arc::new(Unused))
    }

    #[test]
    fn test_message_order() {
        let prompt = spec()
            .user("Tell me about {topic}")
            .user_with(|u| u.param("topic", "Rust"))
            .developer("dev")
            .messages(vec![Message::user("earlier"), Message::assistant("reply")])
            .system("You are {role}")
            .system_with(|s| s.param("role", "helpful"))
            .to_prompt()
            .unwrap();

        let types: Vec<MessageType> = prompt.instructions().iter().map(Message::message_type).collect();
        assert_eq!(
            types,
            vec![
                MessageType::System,
                MessageType::User,
                MessageType::Assistant,
                MessageType::Developer,
                MessageType::User,
            ]
        );
        assert_eq!(prompt.system_message().unwrap().text, "You are helpful");
        assert_eq!(prompt.user_message().unwrap().text, "Tell me about Rust");
    }

    #[test]
    fn test_unrendered_text_keeps_braces() {
        let prompt = spec().user(r#"Reply with {"ok": true}"#).to_prompt().unwrap();
        assert_eq!(prompt.user_message().unwrap().text, r#"Reply with {"ok": true}"#);
    }

    #[test]
    fn test_options_merge_over_defaults_and_tools_are_applied() {
        let mut spec = spec();
        spec.default_options = Some(Box::new(
            DefaultChatOptions::builder()
                .model("llama3.2")
                .temperature(0.7)
                .tool_names(["weather"])
                .build(),
        ));
        let mut context = HashMap::new();
        context.insert("tenant".to_string(), Value::from("acme"));
        let prompt = spec
            .user("q")
            .options(DefaultChatOptions::builder().temperature(0.1).build())
            .tool_names(["clock"])
            .tool_context(context)
            .to_prompt()
            .unwrap();

        let options = prompt.options().unwrap();
        assert_eq!(options.sampling().model.as_deref(), Some("llama3.2"));
        assert_eq!(options.sampling().temperature, Some(0.1));
        let tools = options.tool_calling().unwrap();
        assert_eq!(tools.tool_names.iter().collect::<Vec<_>>(), vec!["clock"]);
        assert_eq!(tools.tool_context["tenant"], "acme");
    }

    #[test]
    fn test_media_without_text_still_adds_user_message() {
        let prompt = spec()
            .user_with(|u| u.media([Media::from_url("image/png", "http://x/cat.png")]))
            .to_prompt()
            .unwrap();
        assert_eq!(prompt.user_message().unwrap().media.len(), 1);
    }
}
