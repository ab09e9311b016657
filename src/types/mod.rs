//! 类型系统模块：定义提示词、消息、响应与文档等核心数据类型。
//!
//! # Types Module
//!
//! Vendor-neutral data model shared by the chat client, the advisor chain, the model
//! bindings and the vector stores.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Prompt`] | Ordered messages plus an options object; immutable once built |
//! | [`Message`] | Union over system, developer, user, assistant and tool messages |
//! | [`ChatResponse`] | Generations returned by a chat model, with metadata |
//! | [`Document`] | Unit of content stored in and retrieved from a vector store |
//! | [`Media`] | Image or audio attachment |
//!
//! ## Example
//!
//! ```rust
//! use ai_client_rust::types::{Message, Prompt};
//!
//! let prompt = Prompt::builder()
//!     .message(Message::system("You are a helpful assistant"))
//!     .message(Message::user("What's the weather?"))
//!     .build();
//! assert_eq!(prompt.user_message().map(|m| m.text.as_str()), Some("What's the weather?"));
//! ```

pub mod document;
pub mod media;
pub mod message;
pub mod prompt;
pub mod response;
pub mod tool;

/// Free-form metadata attached to messages, generations and documents.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

pub use document::{Document, DocumentBuilder, DISTANCE_METADATA_KEY};
pub use media::{Media, MediaData};
pub use message::{
    AssistantMessage, DeveloperMessage, Message, MessageType, SystemMessage, ToolResponseMessage,
    UserMessage,
};
pub use prompt::{Prompt, PromptBuilder};
pub use response::{ChatGenerationMetadata, ChatResponse, ChatResponseMetadata, Generation, Usage};
pub use tool::{ToolCall, ToolResponse};
