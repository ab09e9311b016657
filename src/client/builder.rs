use super::chat::{AdvisorSpec, ChatClientRequestSpec, PromptSystemSpec, PromptUserSpec};
use super::core::ChatClient;
use crate::advisor::{AdvisorContext, AdvisorHandle};
use crate::model::ChatModel;
use crate::options::ChatOptions;
use crate::tool::ToolCallback;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Builder for [`ChatClient`]; every setting becomes a default of each request.
pub struct ChatClientBuilder {
    defaults: ChatClientRequestSpec,
}

impl ChatClientBuilder {
    pub(crate) fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            defaults: ChatClientRequestSpec::new(model),
        }
    }

    pub(crate) fn from_defaults(defaults: ChatClientRequestSpec) -> Self {
        Self { defaults }
    }

    pub fn default_system(mut self, text: impl Into<String>) -> Self {
        self.defaults = self.defaults.system(text);
        self
    }

    pub fn default_system_with(mut self, f: impl FnOnce(PromptSystemSpec) -> PromptSystemSpec) -> Self {
        self.defaults = self.defaults.system_with(f);
        self
    }

    pub fn default_user(mut self, text: impl Into<String>) -> Self {
        self.defaults = self.defaults.user(text);
        self
    }

    pub fn default_user_with(mut self, f: impl FnOnce(PromptUserSpec) -> PromptUserSpec) -> Self {
        self.defaults = self.defaults.user_with(f);
        self
    }

    pub fn default_advisors(mut self, f: impl FnOnce(AdvisorSpec) -> AdvisorSpec) -> Self {
        self.defaults = self.defaults.advisors(f);
        self
    }

    pub fn default_advisor(mut self, advisor: AdvisorHandle) -> Self {
        self.defaults = self.defaults.advisor(advisor);
        self
    }

    pub fn default_advisor_params(mut self, params: AdvisorContext) -> Self {
        self.defaults = self.defaults.advisors(|a| a.params(params));
        self
    }

    /// Base options; per-request options are merged over them.
    pub fn default_options(mut self, options: impl ChatOptions + 'static) -> Self {
        self.defaults.default_options = Some(Box::new(options));
        self
    }

    pub fn default_tool_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.defaults = self.defaults.tool_names(names);
        self
    }

    pub fn default_tool_callbacks(
        mut self,
        callbacks: impl IntoIterator<Item = Arc<dyn ToolCallback>>,
    ) -> Self {
        self.defaults = self.defaults.tool_callbacks(callbacks);
        self
    }

    pub fn default_tool_context(mut self, context: HashMap<String, Value>) -> Self {
        self.defaults = self.defaults.tool_context(context);
        self
    }

    pub fn build(self) -> ChatClient {
        ChatClient::from_defaults(self.defaults)
    }
}
