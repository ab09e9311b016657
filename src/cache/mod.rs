//! 响应缓存模块：提供可插拔的缓存后端以减少重复的模型调用。
//!
//! # Response Caching Module
//!
//! Used by [`ResponseCacheAdvisor`](crate::advisor::ResponseCacheAdvisor) to answer a
//! repeated prompt without reaching the model.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheManager`] | Typed get/set on top of a backend, with TTL and hit statistics |
//! | [`CacheConfig`] | TTL, size limit and key prefix |
//! | [`CacheBackend`] | Trait for custom backends |
//! | [`MemoryCache`] | In-memory LRU cache with per-entry TTL |
//! | [`CacheKey`] | SHA-256 of a prompt's canonical JSON |
//!
//! ```rust
//! use ai_client_rust::cache::{CacheConfig, CacheManager, MemoryCache};
//! use std::time::Duration;
//!
//! let cache = CacheManager::new(
//!     CacheConfig::new().with_ttl(Duration::from_secs(600)),
//!     Box::new(MemoryCache::new(1000)),
//! );
//! assert_eq!(cache.backend_name(), "memory");
//! ```

mod backend;
mod key;
mod manager;

pub use backend::{CacheBackend, MemoryCache, NullCache};
pub use key::CacheKey;
pub use manager::{CacheConfig, CacheManager, CacheStats};
