//! Cache key derivation.

use crate::types::Prompt;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub hash: String,
    pub model: Option<String>,
}

impl CacheKey {
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Hash the prompt's messages together with its sampling options.
    ///
    /// Tool callbacks are not part of the key; two prompts differing only in the
    /// registered tools share an entry.
    pub fn for_prompt(prompt: &Prompt) -> Result<Self> {
        let sampling = prompt.options().map(|o| o.sampling());
        let canonical = serde_json::to_string(&json!({
            "messages": prompt.instructions(),
            "sampling": sampling,
        }))?;
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let hash: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();

        let mut key = CacheKey::new(hash);
        if let Some(model) = sampling.and_then(|s| s.model) {
            key = key.with_model(model);
        }
        Ok(key)
    }

    pub fn as_str(&self) -> &str {
        &self.hash
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hash)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
