//! # ai-client-rust
//!
//! 这是一个面向大模型应用的客户端库：聊天客户端、顾问链、模型抽象、Ollama 绑定与向量存储。
//!
//! Client abstractions for LLM applications: a fluent [`ChatClient`] over any
//! [`ChatModel`](model::ChatModel), an ordered advisor chain wrapping every call and
//! stream, portable options with vendor extensions, tool calling, and vector stores.
//!
//! ## Overview
//!
//! A caller builds a prompt through the chat client. The request then passes through the
//! advisors in onion order; the innermost link calls the chat model, which performs the
//! HTTP call. The response travels back out through the same advisors, and the caller
//! reads content or a typed entity from it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_client_rust::advisor::{AdvisorHandle, SimpleLoggerAdvisor};
//! use ai_client_rust::ollama::{OllamaChatModel, OllamaOptions};
//! use ai_client_rust::ChatClient;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> ai_client_rust::Result<()> {
//!     let model = OllamaChatModel::builder()
//!         .default_options(OllamaOptions::builder().model("llama3.2").build())
//!         .build()?;
//!     let client = ChatClient::builder(Arc::new(model))
//!         .default_system("You are a concise assistant")
//!         .default_advisor(AdvisorHandle::both(SimpleLoggerAdvisor::default()))
//!         .build();
//!
//!     let answer = client.prompt_text("Why is the sky blue?").call().content().await?;
//!     println!("{}", answer.unwrap_or_default());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Fluent chat client, prompt templates and output converters |
//! | [`advisor`] | Advisor chain, request/response wrappers and the provided advisors |
//! | [`model`] | `ChatModel` / `EmbeddingModel` traits and batching |
//! | [`options`] | Capability-based chat and embedding options |
//! | [`tool`] | Tool definitions, callbacks and the tool calling manager |
//! | [`types`] | Prompts, messages, responses and documents |
//! | [`ollama`] | Ollama REST client, options and models |
//! | [`vectorstore`] | Vector store trait, filters, in-memory and Qdrant stores |
//! | [`cache`] | Response cache backends |
//! | [`config`] | YAML / environment configuration |

pub mod advisor;
pub mod cache;
pub mod client;
pub mod config;
pub mod logging;
pub mod model;
#[cfg(feature = "ollama")]
pub mod ollama;
pub mod options;
pub mod tool;
pub mod transport;
pub mod types;
pub mod vectorstore;

pub use client::{ChatClient, ChatClientBuilder};
pub use types::{ChatResponse, Document, Message, Prompt};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A pinned, boxed stream of `Result<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
