//! 模型抽象模块：聊天模型、向量化模型、批处理策略与向量运算。

mod batching;
mod chat;
mod embedding;
pub mod vectors;

pub use batching::{
    BatchingStrategy, TokenCountBatchingStrategy, DEFAULT_MAX_INPUT_TOKEN_COUNT,
    DEFAULT_RESERVE_PERCENTAGE,
};
pub use chat::ChatModel;
pub use embedding::{
    Embedding, EmbeddingModel, EmbeddingRequest, EmbeddingResponse, EmbeddingUsage,
};
