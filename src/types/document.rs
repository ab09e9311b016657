use super::media::Media;
use super::Metadata;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata key under which vector stores report `1 - score`.
pub const DISTANCE_METADATA_KEY: &str = "distance";

/// Portable unit of content for embedding and similarity search.
///
/// Exactly one of `text` / `media` is set. Documents are replaced by id, never
/// edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    media: Option<Media>,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    score: Option<f64>,
}

impl Document {
    /// Text document with a random id.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: Some(text.into()),
            media: None,
            metadata: Metadata::new(),
            score: None,
        }
    }

    pub fn builder() -> DocumentBuilder {
        DocumentBuilder::default()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn media(&self) -> Option<&Media> {
        self.media.as_ref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn score(&self) -> Option<f64> {
        self.score
    }

    pub fn is_text(&self) -> bool {
        self.text.is_some()
    }

    /// Content followed by `key: value` metadata lines, for RAG prompts.
    pub fn formatted_content(&self) -> String {
        let mut out = self.text.clone().unwrap_or_default();
        for (key, value) in &self.metadata {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out.push_str(&format!("\n{}: {}", key, value));
        }
        out
    }

    pub fn mutate(&self) -> DocumentBuilder {
        DocumentBuilder {
            id: Some(self.id.clone()),
            text: self.text.clone(),
            media: self.media.clone(),
            metadata: self.metadata.clone(),
            score: self.score,
        }
    }
}

#[derive(Debug, Default)]
pub struct DocumentBuilder {
    id: Option<String>,
    text: Option<String>,
    media: Option<Media>,
    metadata: Metadata,
    score: Option<f64>,
}

impl DocumentBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn media(mut self, media: Media) -> Self {
        self.media = Some(media);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn metadata_map(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn build(self) -> Result<Document> {
        match (&self.text, &self.media) {
            (Some(_), Some(_)) => {
                return Err(Error::validation(
                    "exactly one of text or media must be specified",
                ))
            }
            (None, None) => return Err(Error::validation("text or media must be specified")),
            _ => {}
        }
        if self.metadata.keys().any(String::is_empty) {
            return Err(Error::validation("metadata keys must not be empty"));
        }
        let id = match self.id {
            Some(id) => {
                Error::require_text(&id, "id")?;
                id
            }
            None => uuid::Uuid::new_v4().to_string(),
        };
        Ok(Document {
            id,
            text: self.text,
            media: self.media,
            metadata: self.metadata,
            score: self.score,
        })
    }
}
