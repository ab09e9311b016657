//! 传输层模块：HTTP 客户端构建与流式响应解码。
//!
//! # Transport Module
//!
//! Shared HTTP plumbing used by the vendor bindings:
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`HttpTransport`] | `reqwest` client with env-overridable defaults and vendor error mapping |
//! | [`TransportConfig`] | Timeouts, pool sizing and proxy settings |
//! | [`decode_ndjson`] | Newline-delimited JSON stream decoder |

mod http;
mod ndjson;

pub use http::{lookup_api_key, HttpTransport, TransportConfig, TransportError};
pub use ndjson::decode_ndjson;
