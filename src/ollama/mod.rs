//! Ollama 模块：Ollama REST API 客户端、请求/响应结构、选项、聊天与向量化模型以及模型拉取。
//!
//! [`OllamaApi`] speaks the wire protocol; [`OllamaChatModel`] and [`OllamaEmbeddingModel`]
//! adapt it to the portable [`ChatModel`](crate::model::ChatModel) and
//! [`EmbeddingModel`](crate::model::EmbeddingModel) traits.

pub mod api;
mod chat_model;
pub mod dto;
mod embedding_model;
pub mod merge;
mod model_manager;
mod options;
mod think;

pub use api::{OllamaApi, DEFAULT_BASE_URL};
pub use chat_model::{OllamaChatModel, OllamaChatModelBuilder, DEFAULT_CHAT_MODEL};
pub use embedding_model::{
    OllamaEmbeddingModel, OllamaEmbeddingModelBuilder, DEFAULT_EMBEDDING_MODEL,
};
pub use model_manager::{ModelManagementOptions, OllamaModelManager, PullModelStrategy};
pub use options::{OllamaOptions, OllamaOptionsBuilder, NON_SUPPORTED_FIELDS};
pub use think::{ThinkLevel, ThinkOption};
