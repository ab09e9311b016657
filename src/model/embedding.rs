//! Embedding types and the embedding model abstraction.

use super::batching::BatchingStrategy;
use crate::options::EmbeddingOptions;
use crate::types::Document;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single embedding vector with its position in the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub index: usize,
    pub output: Vec<f32>,
}

impl Embedding {
    pub fn new(index: usize, output: Vec<f32>) -> Self {
        Self { index, output }
    }

    pub fn dimensions(&self) -> usize {
        self.output.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct EmbeddingRequest {
    pub inputs: Vec<String>,
    pub options: Option<Box<dyn EmbeddingOptions>>,
}

impl EmbeddingRequest {
    pub fn new(inputs: Vec<String>) -> Self {
        Self {
            inputs,
            options: None,
        }
    }

    pub fn single(text: impl Into<String>) -> Self {
        Self::new(vec![text.into()])
    }

    pub fn with_options(mut self, options: Box<dyn EmbeddingOptions>) -> Self {
        self.options = Some(options);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingUsage {
    pub prompt_tokens: u64,
    pub total_tokens: u64,
}

impl EmbeddingUsage {
    pub fn new(prompt_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            total_tokens: prompt_tokens,
        }
    }

    pub fn add(&mut self, other: &EmbeddingUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.total_tokens += other.total_tokens;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub embeddings: Vec<Embedding>,
    pub model: String,
    pub usage: EmbeddingUsage,
}

impl EmbeddingResponse {
    pub fn new(embeddings: Vec<Embedding>, model: String, usage: EmbeddingUsage) -> Self {
        Self {
            embeddings,
            model,
            usage,
        }
    }

    pub fn first(&self) -> Option<&Embedding> {
        self.embeddings.first()
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// A backend turning text into vectors.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    async fn call(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self.call(EmbeddingRequest::single(text)).await?;
        response
            .embeddings
            .into_iter()
            .next()
            .map(|e| e.output)
            .ok_or_else(|| Error::runtime("Embedding model returned no embedding"))
    }

    async fn embed_all(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let response = self.call(EmbeddingRequest::new(texts)).await?;
        Ok(response.embeddings.into_iter().map(|e| e.output).collect())
    }

    /// Embed documents batch by batch; the result is aligned with `documents`.
    async fn embed_documents(
        &self,
        documents: &[Document],
        options: Option<Box<dyn EmbeddingOptions>>,
        batching: &dyn BatchingStrategy,
    ) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(documents.len());
        for batch in batching.batch(documents)? {
            let inputs = batch
                .iter()
                .map(|d| d.text().unwrap_or_default().to_string())
                .collect::<Vec<_>>();
            let expected = inputs.len();
            let request = EmbeddingRequest {
                inputs,
                options: options.clone(),
            };
            let mut response = self.call(request).await?;
            if response.embeddings.len() != expected {
                return Err(Error::runtime(format!(
                    "Embedding model returned {} embeddings for {} inputs",
                    response.embeddings.len(),
                    expected
                )));
            }
            response.embeddings.sort_by_key(|e| e.index);
            vectors.extend(response.embeddings.into_iter().map(|e| e.output));
        }
        Ok(vectors)
    }

    /// Output dimension, measured by embedding a sample string.
    async fn dimensions(&self) -> Result<usize> {
        Ok(self.embed("Test String").await?.len())
    }
}
