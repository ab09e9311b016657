use super::builder::ChatClientBuilder;
use super::chat::ChatClientRequestSpec;
use crate::model::ChatModel;
use crate::types::Prompt;
use std::sync::Arc;

/// Fluent front end over a [`ChatModel`] and an advisor chain.
///
/// A client is cheap to clone and holds only immutable defaults; each
/// [`prompt`](Self::prompt) starts an independent request seeded with them.
///
/// ```rust,no_run
/// # async fn demo(model: std::sync::Arc<dyn ai_client_rust::model::ChatModel>) -> ai_client_rust::Result<()> {
/// use ai_client_rust::client::ChatClient;
///
/// let client = ChatClient::builder(model)
///     .default_system("You are a friendly assistant")
///     .build();
/// let answer = client.prompt().user("Tell me a joke").call().content().await?;
/// # Ok(()) }
/// ```
#[derive(Clone)]
pub struct ChatClient {
    defaults: Arc<ChatClientRequestSpec>,
}

impl ChatClient {
    pub fn builder(model: Arc<dyn ChatModel>) -> ChatClientBuilder {
        ChatClientBuilder::new(model)
    }

    pub fn create(model: Arc<dyn ChatModel>) -> Self {
        Self::builder(model).build()
    }

    pub(crate) fn from_defaults(defaults: ChatClientRequestSpec) -> Self {
        Self {
            defaults: Arc::new(defaults),
        }
    }

    pub fn prompt(&self) -> ChatClientRequestSpec {
        self.defaults.as_ref().clone()
    }

    pub fn prompt_text(&self, user: impl Into<String>) -> ChatClientRequestSpec {
        self.prompt().user(user)
    }

    /// Start from an existing prompt: its messages are sent as-is and its options are
    /// merged over the defaults.
    pub fn prompt_with(&self, prompt: Prompt) -> ChatClientRequestSpec {
        let mut spec = self.prompt().messages(prompt.instructions().iter().cloned());
        if let Some(options) = prompt.options() {
            spec.options = Some(options.clone_options());
        }
        spec
    }

    /// A builder seeded with this client's defaults.
    pub fn mutate(&self) -> ChatClientBuilder {
        ChatClientBuilder::from_defaults(self.defaults.as_ref().clone())
    }
}
