//! 向量存储模块：文档写入、删除与相似度检索的统一抽象。
//!
//! # Vector Store Module
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`VectorStore`] | Add / delete / similarity search over [`Document`]s |
//! | [`SearchRequest`] | Query text, `top_k`, similarity threshold and metadata filter |
//! | [`filter`] | Portable filter expressions and their Qdrant translation |
//! | [`SimpleVectorStore`] | In-memory store using cosine similarity |
//! | [`QdrantVectorStore`] | Qdrant adapter over the REST API |
//!
//! Stores never mutate a document in place; adding a document with an existing id
//! replaces it.

pub mod filter;
#[cfg(feature = "qdrant")]
mod qdrant;
mod simple;

#[cfg(feature = "qdrant")]
pub use qdrant::{
    PointId, PointStruct, PointsSelector, QdrantClient, QdrantRestClient, QdrantVectorStore,
    QdrantVectorStoreBuilder, ScoredPoint, SearchPoints, DEFAULT_COLLECTION_NAME,
    DEFAULT_CONTENT_FIELD_NAME,
};
pub use simple::SimpleVectorStore;

use crate::types::Document;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use filter::Expression;

pub const DEFAULT_TOP_K: usize = 4;

/// Threshold that accepts every result.
pub const SIMILARITY_THRESHOLD_ACCEPT_ALL: f64 = 0.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: usize,
    pub similarity_threshold: f64,
    pub filter_expression: Option<Expression>,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            top_k: DEFAULT_TOP_K,
            similarity_threshold: SIMILARITY_THRESHOLD_ACCEPT_ALL,
            filter_expression: None,
        }
    }
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn builder() -> SearchRequestBuilder {
        SearchRequestBuilder::default()
    }

    /// Builder pre-filled with this request's values.
    pub fn mutate(&self) -> SearchRequestBuilder {
        SearchRequestBuilder {
            request: self.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct SearchRequestBuilder {
    request: SearchRequest,
}

impl SearchRequestBuilder {
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.request.query = query.into();
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.request.top_k = top_k;
        self
    }

    pub fn similarity_threshold(mut self, threshold: f64) -> Self {
        self.request.similarity_threshold = threshold;
        self
    }

    pub fn similarity_threshold_all(self) -> Self {
        self.similarity_threshold(SIMILARITY_THRESHOLD_ACCEPT_ALL)
    }

    pub fn filter_expression(mut self, expression: Option<Expression>) -> Self {
        self.request.filter_expression = expression;
        self
    }

    pub fn build(self) -> Result<SearchRequest> {
        let threshold = self.request.similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::validation_with_context(
                "Similarity threshold must be in [0,1] range.",
                ErrorContext::new()
                    .with_field_path("similarity_threshold")
                    .with_details(threshold.to_string()),
            ));
        }
        Ok(self.request)
    }
}

/// Storage and similarity search over embedded documents.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn name(&self) -> &str;

    async fn add(&self, documents: Vec<Document>) -> Result<()>;

    async fn delete(&self, ids: &[String]) -> Result<()>;

    async fn delete_by_filter(&self, expression: &Expression) -> Result<()>;

    /// Best matches first; each document carries its `score` and a `distance` metadata entry.
    async fn similarity_search(&self, request: &SearchRequest) -> Result<Vec<Document>>;

    async fn similarity_search_text(&self, query: &str) -> Result<Vec<Document>> {
        self.similarity_search(&SearchRequest::new(query)).await
    }
}
