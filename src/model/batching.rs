use crate::types::Document;
use crate::{Error, ErrorContext, Result};

/// Splits documents into batches that fit an embedding model's input window.
pub trait BatchingStrategy: Send + Sync {
    fn batch(&self, documents: &[Document]) -> Result<Vec<Vec<Document>>>;
}

/// Default input window of common embedding models.
pub const DEFAULT_MAX_INPUT_TOKEN_COUNT: usize = 8191;

/// Share of the window kept free for tokenizer drift.
pub const DEFAULT_RESERVE_PERCENTAGE: f64 = 0.1;

/// Batches by estimated token count (four characters per token).
#[derive(Debug, Clone, Copy)]
pub struct TokenCountBatchingStrategy {
    max_input_token_count: usize,
}

impl Default for TokenCountBatchingStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INPUT_TOKEN_COUNT, DEFAULT_RESERVE_PERCENTAGE)
    }
}

impl TokenCountBatchingStrategy {
    pub fn new(max_input_token_count: usize, reserve_percentage: f64) -> Self {
        let reserve = reserve_percentage.clamp(0.0, 1.0);
        Self {
            max_input_token_count: (max_input_token_count as f64 * (1.0 - reserve)).round() as usize,
        }
    }

    /// Effective per-batch budget after the reserve.
    pub fn max_input_token_count(&self) -> usize {
        self.max_input_token_count
    }

    pub fn estimate_tokens(text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

impl BatchingStrategy for TokenCountBatchingStrategy {
    fn batch(&self, documents: &[Document]) -> Result<Vec<Vec<Document>>> {
        let mut batches = Vec::new();
        let mut current = Vec::new();
        let mut current_tokens = 0usize;

        for doc in documents {
            let tokens = Self::estimate_tokens(&doc.formatted_content());
            if tokens > self.max_input_token_count {
                return Err(Error::runtime_with_context(
                    "Tokens in a single document exceeds the maximum number of allowed input tokens",
                    ErrorContext::new()
                        .with_field_path("document.id")
                        .with_details(format!(
                            "document {} has ~{} tokens, limit {}",
                            doc.id(),
                            tokens,
                            self.max_input_token_count
                        )),
                ));
            }
            if current_tokens + tokens > self.max_input_token_count && !current.is_empty() {
                batches.push(std::mem::take(&mut current));
                current_tokens = 0;
            }
            current_tokens += tokens;
            current.push(doc.clone());
        }
        if !current.is_empty() {
            batches.push(current);
        }
        Ok(batches)
    }
}
