//! 选项模块：以能力特征（采样、工具调用、结构化输出）组合聊天与向量化参数。
//!
//! Chat options are modelled as orthogonal capabilities instead of an inheritance tree:
//!
//! - [`SamplingOptions`]: portable generation parameters every model understands.
//! - [`ToolCallingOptions`]: tool callbacks, tool names, tool context, internal execution flag.
//! - [`StructuredOutputOptions`]: JSON schema the answer must satisfy.
//!
//! A vendor options type implements [`ChatOptions`] and exposes whichever capabilities it
//! supports. Defaults and per-call overrides are combined with pure `merge` functions
//! (override wins when set), never by mutating a shared default object.

mod sampling;
mod tool_calling;

pub use sampling::SamplingOptions;
pub use tool_calling::{StructuredOutputOptions, ToolCallingOptions};

use crate::tool::ToolCallback;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Options accepted by a chat model.
pub trait ChatOptions: Send + Sync + Debug {
    /// Portable sampling parameters.
    fn sampling(&self) -> SamplingOptions;

    /// Tool-calling capability, when supported.
    fn tool_calling(&self) -> Option<&ToolCallingOptions> {
        None
    }

    fn tool_calling_mut(&mut self) -> Option<&mut ToolCallingOptions> {
        None
    }

    /// Structured-output capability, when supported.
    fn structured_output(&self) -> Option<&StructuredOutputOptions> {
        None
    }

    fn structured_output_mut(&mut self) -> Option<&mut StructuredOutputOptions> {
        None
    }

    /// Used by vendor bindings to recover their concrete options type.
    fn as_any(&self) -> &dyn Any;

    fn clone_options(&self) -> Box<dyn ChatOptions>;

    /// Combine `self` (defaults) with `overrides`; set override values win.
    ///
    /// The default keeps only the portable capabilities. Vendor types override this to
    /// carry their own fields through.
    fn merge_with(&self, overrides: &dyn ChatOptions) -> Box<dyn ChatOptions> {
        let defaults = DefaultChatOptions {
            sampling: self.sampling(),
            tool_calling: self.tool_calling().cloned().unwrap_or_default(),
            structured_output: self.structured_output().cloned().unwrap_or_default(),
        };
        Box::new(defaults.merge(&DefaultChatOptions::from_options(overrides)))
    }
}

/// `defaults.merge(runtime)` where either side may be absent.
pub fn merge_options(
    defaults: Option<&dyn ChatOptions>,
    runtime: Option<&dyn ChatOptions>,
) -> Option<Box<dyn ChatOptions>> {
    match (defaults, runtime) {
        (Some(d), Some(r)) => Some(d.merge_with(r)),
        (Some(d), None) => Some(d.clone_options()),
        (None, Some(r)) => Some(r.clone_options()),
        (None, None) => None,
    }
}

impl Clone for Box<dyn ChatOptions> {
    fn clone(&self) -> Self {
        self.clone_options()
    }
}

/// Portable options implementing every capability.
#[derive(Debug, Clone, Default)]
pub struct DefaultChatOptions {
    pub sampling: SamplingOptions,
    pub tool_calling: ToolCallingOptions,
    pub structured_output: StructuredOutputOptions,
}

impl DefaultChatOptions {
    pub fn builder() -> DefaultChatOptionsBuilder {
        DefaultChatOptionsBuilder::default()
    }

    /// Copy the portable capabilities of any options object.
    pub fn from_options(options: &dyn ChatOptions) -> Self {
        Self {
            sampling: options.sampling(),
            tool_calling: options.tool_calling().cloned().unwrap_or_default(),
            structured_output: options.structured_output().cloned().unwrap_or_default(),
        }
    }

    pub fn merge(&self, overrides: &DefaultChatOptions) -> DefaultChatOptions {
        DefaultChatOptions {
            sampling: self.sampling.merge(&overrides.sampling),
            tool_calling: self.tool_calling.merge(&overrides.tool_calling),
            structured_output: StructuredOutputOptions {
                output_schema: overrides
                    .structured_output
                    .output_schema
                    .clone()
                    .or_else(|| self.structured_output.output_schema.clone()),
            },
        }
    }
}

impl ChatOptions for DefaultChatOptions {
    fn sampling(&self) -> SamplingOptions {
        self.sampling.clone()
    }

    fn tool_calling(&self) -> Option<&ToolCallingOptions> {
        Some(&self.tool_calling)
    }

    fn tool_calling_mut(&mut self) -> Option<&mut ToolCallingOptions> {
        Some(&mut self.tool_calling)
    }

    fn structured_output(&self) -> Option<&StructuredOutputOptions> {
        Some(&self.structured_output)
    }

    fn structured_output_mut(&mut self) -> Option<&mut StructuredOutputOptions> {
        Some(&mut self.structured_output)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_options(&self) -> Box<dyn ChatOptions> {
        Box::new(self.clone())
    }
}

#[derive(Debug, Default)]
pub struct DefaultChatOptionsBuilder {
    options: DefaultChatOptions,
}

impl DefaultChatOptionsBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.options.sampling.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.options.sampling.temperature = Some(temperature);
        self
    }

    pub fn top_k(mut self, top_k: u32) -> Self {
        self.options.sampling.top_k = Some(top_k);
        self
    }

    pub fn top_p(mut self, top_p: f64) -> Self {
        self.options.sampling.top_p = Some(top_p);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.options.sampling.max_tokens = Some(max_tokens);
        self
    }

    pub fn stop_sequences(mut self, stop: Vec<String>) -> Self {
        self.options.sampling.stop_sequences = Some(stop);
        self
    }

    pub fn tool_callbacks(mut self, callbacks: Vec<Arc<dyn ToolCallback>>) -> Self {
        self.options.tool_calling.tool_callbacks = callbacks;
        self
    }

    pub fn tool_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.tool_calling.tool_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn tool_context(mut self, context: HashMap<String, Value>) -> Self {
        self.options.tool_calling.tool_context = context;
        self
    }

    pub fn internal_tool_execution_enabled(mut self, enabled: bool) -> Self {
        self.options.tool_calling.internal_tool_execution_enabled = Some(enabled);
        self
    }

    pub fn output_schema(mut self, schema: Value) -> Self {
        self.options.structured_output.output_schema = Some(schema);
        self
    }

    pub fn build(self) -> DefaultChatOptions {
        self.options
    }
}

/// Options accepted by an embedding model.
pub trait EmbeddingOptions: Send + Sync + Debug {
    fn model(&self) -> Option<&str>;
    fn dimensions(&self) -> Option<u32>;
    fn as_any(&self) -> &dyn Any;
    fn clone_options(&self) -> Box<dyn EmbeddingOptions>;
}

impl Clone for Box<dyn EmbeddingOptions> {
    fn clone(&self) -> Self {
        self.clone_options()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultEmbeddingOptions {
    pub model: Option<String>,
    pub dimensions: Option<u32>,
}

impl EmbeddingOptions for DefaultEmbeddingOptions {
    fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    fn dimensions(&self) -> Option<u32> {
        self.dimensions
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_options(&self) -> Box<dyn EmbeddingOptions> {
        Box::new(self.clone())
    }
}
