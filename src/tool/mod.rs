//! 工具调用模块：工具定义、回调、解析器与工具调用管理器。
//!
//! A [`ToolCallback`] is something the model may ask to run. The
//! [`ToolCallingManager`] resolves the callbacks an options object refers to, executes the
//! tool calls found in a model response and builds the follow-up conversation.

mod function;
mod manager;
mod resolver;

pub use function::FunctionToolCallback;
pub use manager::{
    ToolCallingManager, ToolCallingManagerBuilder, ToolExecutionErrorProcessor,
    ToolExecutionResult, RETURN_DIRECT_FINISH_REASON,
};
pub use resolver::{StaticToolCallbackResolver, ToolCallbackResolver};

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Description of a tool as sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToolMetadata {
    /// Hand the tool result straight back to the caller instead of the model.
    pub return_direct: bool,
}

/// Key under which the conversation so far is exposed to tools.
pub const TOOL_CALL_HISTORY: &str = "tool_call_history";

/// Caller-provided data handed to every tool invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolContext {
    context: HashMap<String, Value>,
}

impl ToolContext {
    pub fn new(context: HashMap<String, Value>) -> Self {
        Self { context }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    pub fn context(&self) -> &HashMap<String, Value> {
        &self.context
    }

    /// Messages exchanged before the current tool call, if recorded.
    pub fn tool_call_history(&self) -> Vec<crate::types::Message> {
        self.context
            .get(TOOL_CALL_HISTORY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }
}

/// A tool the model can invoke.
#[async_trait]
pub trait ToolCallback: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::default()
    }

    /// Run the tool with the model-produced JSON arguments; returns the result text.
    async fn call(&self, arguments: &str, context: &ToolContext) -> Result<String>;
}
