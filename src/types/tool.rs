//! Tool call records carried by assistant and tool messages.

use serde::{Deserialize, Serialize};

/// Tool call (invocation requested by the model)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String, // "function"
    pub name: String,
    /// Arguments as JSON text, exactly as the model produced them.
    pub arguments: String,
}

impl ToolCall {
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: "function".to_string(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// Tool result (response to a tool call)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub id: String,
    pub name: String,
    pub response_data: String,
}

impl ToolResponse {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        response_data: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            response_data: response_data.into(),
        }
    }
}
