//! 聊天客户端模块：在聊天模型与顾问链之上提供流式构建的请求接口。
//!
//! Developer-friendly goal: keep the public surface small and predictable.
//! Implementation details are split into submodules under `src/client/`.

pub mod builder;
pub mod chat;
pub mod converter;
pub mod core;
pub mod response;
pub mod template;

pub use builder::ChatClientBuilder;
pub use chat::{AdvisorSpec, ChatClientRequestSpec, PromptSystemSpec, PromptUserSpec};
pub use converter::BeanOutputConverter;
pub use core::ChatClient;
pub use response::{content_of, CallResponseSpec, ResponseEntity, StreamResponseSpec, OUTPUT_FORMAT};
pub use template::PromptTemplate;
