use crate::tool::ToolCallback;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Tool-calling capability of a chat options object.
#[derive(Clone, Default)]
pub struct ToolCallingOptions {
    pub tool_callbacks: Vec<Arc<dyn ToolCallback>>,
    pub tool_names: BTreeSet<String>,
    pub tool_context: HashMap<String, Value>,
    /// `None` means enabled.
    pub internal_tool_execution_enabled: Option<bool>,
}

impl ToolCallingOptions {
    pub fn is_internal_tool_execution_enabled(&self) -> bool {
        self.internal_tool_execution_enabled.unwrap_or(true)
    }

    pub fn is_empty(&self) -> bool {
        self.tool_callbacks.is_empty() && self.tool_names.is_empty()
    }

    /// Runtime callbacks and names replace the defaults when non-empty; tool contexts
    /// are unioned with runtime entries winning per key.
    pub fn merge(&self, runtime: &ToolCallingOptions) -> ToolCallingOptions {
        let tool_callbacks = if runtime.tool_callbacks.is_empty() {
            self.tool_callbacks.clone()
        } else {
            runtime.tool_callbacks.clone()
        };
        let tool_names = if runtime.tool_names.is_empty() {
            self.tool_names.clone()
        } else {
            runtime.tool_names.clone()
        };
        let mut tool_context = self.tool_context.clone();
        tool_context.extend(
            runtime
                .tool_context
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        ToolCallingOptions {
            tool_callbacks,
            tool_names,
            tool_context,
            internal_tool_execution_enabled: runtime
                .internal_tool_execution_enabled
                .or(self.internal_tool_execution_enabled),
        }
    }
}

impl fmt::Debug for ToolCallingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let callbacks: Vec<String> = self
            .tool_callbacks
            .iter()
            .map(|c| c.definition().name)
            .collect();
        f.debug_struct("ToolCallingOptions")
            .field("tool_callbacks", &callbacks)
            .field("tool_names", &self.tool_names)
            .field("tool_context", &self.tool_context)
            .field(
                "internal_tool_execution_enabled",
                &self.internal_tool_execution_enabled,
            )
            .finish()
    }
}

/// Structured-output capability: the JSON schema the answer must satisfy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredOutputOptions {
    pub output_schema: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_runtime_names_win_and_context_is_unioned() {
        let defaults = ToolCallingOptions {
            tool_names: ["weather".to_string()].into_iter().collect(),
            tool_context: [("tenant".to_string(), json!("a")), ("x".to_string(), json!(1))]
                .into_iter()
                .collect(),
            internal_tool_execution_enabled: Some(false),
            ..Default::default()
        };
        let runtime = ToolCallingOptions {
            tool_names: ["clock".to_string()].into_iter().collect(),
            tool_context: [("tenant".to_string(), json!("b"))].into_iter().collect(),
            ..Default::default()
        };
        let merged = defaults.merge(&runtime);
        assert_eq!(merged.tool_names.iter().collect::<Vec<_>>(), vec!["clock"]);
        assert_eq!(merged.tool_context["tenant"], json!("b"));
        assert_eq!(merged.tool_context["x"], json!(1));
        assert!(!merged.is_internal_tool_execution_enabled());
    }

    #[test]
    fn test_empty_runtime_keeps_defaults() {
        let defaults = ToolCallingOptions {
            tool_names: ["weather".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let merged = defaults.merge(&ToolCallingOptions::default());
        assert!(merged.tool_names.contains("weather"));
        assert!(merged.is_internal_tool_execution_enabled());
    }
}
