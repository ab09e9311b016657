//! Chat messages: a closed union over the five conversation roles.

use super::media::Media;
use super::tool::{ToolCall, ToolResponse};
use super::Metadata;
use serde::{Deserialize, Serialize};

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    System,
    Developer,
    User,
    Assistant,
    Tool,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::System => "system",
            MessageType::Developer => "developer",
            MessageType::User => "user",
            MessageType::Assistant => "assistant",
            MessageType::Tool => "tool",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMessage {
    pub text: String,
}

impl SystemMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeveloperMessage {
    pub text: String,
}

impl DeveloperMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<Media>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl UserMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_media(mut self, media: Vec<Media>) -> Self {
        self.media = media;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<Media>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl AssistantMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResponseMessage {
    pub responses: Vec<ToolResponse>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl ToolResponseMessage {
    pub fn new(responses: Vec<ToolResponse>) -> Self {
        Self {
            responses,
            metadata: Metadata::new(),
        }
    }
}

/// A single conversation entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "lowercase")]
pub enum Message {
    System(SystemMessage),
    Developer(DeveloperMessage),
    User(UserMessage),
    Assistant(AssistantMessage),
    Tool(ToolResponseMessage),
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Message::System(SystemMessage::new(text))
    }

    pub fn developer(text: impl Into<String>) -> Self {
        Message::Developer(DeveloperMessage::new(text))
    }

    pub fn user(text: impl Into<String>) -> Self {
        Message::User(UserMessage::new(text))
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Message::Assistant(AssistantMessage::new(text))
    }

    pub fn tool(responses: Vec<ToolResponse>) -> Self {
        Message::Tool(ToolResponseMessage::new(responses))
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Message::System(_) => MessageType::System,
            Message::Developer(_) => MessageType::Developer,
            Message::User(_) => MessageType::User,
            Message::Assistant(_) => MessageType::Assistant,
            Message::Tool(_) => MessageType::Tool,
        }
    }

    /// Text content; tool response messages have none.
    pub fn text(&self) -> &str {
        match self {
            Message::System(m) => &m.text,
            Message::Developer(m) => &m.text,
            Message::User(m) => &m.text,
            Message::Assistant(m) => &m.text,
            Message::Tool(_) => "",
        }
    }

    pub fn media(&self) -> &[Media] {
        match self {
            Message::User(m) => &m.media,
            Message::Assistant(m) => &m.media,
            _ => &[],
        }
    }

    pub fn as_user(&self) -> Option<&UserMessage> {
        match self {
            Message::User(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        match self {
            Message::Assistant(m) => Some(m),
            _ => None,
        }
    }
}

impl From<SystemMessage> for Message {
    fn from(m: SystemMessage) -> Self {
        Message::System(m)
    }
}

impl From<UserMessage> for Message {
    fn from(m: UserMessage) -> Self {
        Message::User(m)
    }
}

impl From<AssistantMessage> for Message {
    fn from(m: AssistantMessage) -> Self {
        Message::Assistant(m)
    }
}

impl From<ToolResponseMessage> for Message {
    fn from(m: ToolResponseMessage) -> Self {
        Message::Tool(m)
    }
}
