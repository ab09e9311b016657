use super::message::AssistantMessage;
use super::Metadata;
use serde::{Deserialize, Serialize};

/// Token usage (when reported by the vendor)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponseMetadata {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub extra: Metadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatGenerationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub extra: Metadata,
}

impl ChatGenerationMetadata {
    pub fn with_finish_reason(reason: impl Into<String>) -> Self {
        Self {
            finish_reason: Some(reason.into()),
            extra: Metadata::new(),
        }
    }
}

/// One candidate answer produced by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub output: AssistantMessage,
    #[serde(default)]
    pub metadata: ChatGenerationMetadata,
}

impl Generation {
    pub fn new(output: AssistantMessage) -> Self {
        Self {
            output,
            metadata: ChatGenerationMetadata::default(),
        }
    }

    pub fn with_metadata(output: AssistantMessage, metadata: ChatGenerationMetadata) -> Self {
        Self { output, metadata }
    }

    pub fn text(&self) -> &str {
        &self.output.text
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.metadata.finish_reason.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub results: Vec<Generation>,
    #[serde(default)]
    pub metadata: ChatResponseMetadata,
}

impl ChatResponse {
    pub fn new(results: Vec<Generation>) -> Self {
        Self {
            results,
            metadata: ChatResponseMetadata::default(),
        }
    }

    pub fn with_metadata(results: Vec<Generation>, metadata: ChatResponseMetadata) -> Self {
        Self { results, metadata }
    }

    /// First generation.
    pub fn result(&self) -> Option<&Generation> {
        self.results.first()
    }

    pub fn has_tool_calls(&self) -> bool {
        self.results.iter().any(|g| g.output.has_tool_calls())
    }

    /// True when any generation finished for one of `reasons` (case-insensitive).
    pub fn has_finish_reasons(&self, reasons: &[&str]) -> bool {
        self.results.iter().any(|g| {
            g.finish_reason()
                .map(|r| reasons.iter().any(|x| x.eq_ignore_ascii_case(r)))
                .unwrap_or(false)
        })
    }
}
