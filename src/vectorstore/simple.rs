use super::filter::Expression;
use super::{SearchRequest, VectorStore};
use crate::model::vectors::cosine_similarity;
use crate::model::{BatchingStrategy, EmbeddingModel, TokenCountBatchingStrategy};
use crate::types::{Document, DISTANCE_METADATA_KEY};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDocument {
    document: Document,
    embedding: Vec<f32>,
}

/// In-memory vector store ranking by cosine similarity.
///
/// Useful for tests and small corpora. The contents can be persisted as JSON with
/// [`SimpleVectorStore::save`] and restored with [`SimpleVectorStore::load`].
pub struct SimpleVectorStore {
    embedding_model: Arc<dyn EmbeddingModel>,
    batching: Box<dyn BatchingStrategy>,
    store: RwLock<HashMap<String, StoredDocument>>,
}

impl SimpleVectorStore {
    pub fn new(embedding_model: Arc<dyn EmbeddingModel>) -> Self {
        Self {
            embedding_model,
            batching: Box::new(TokenCountBatchingStrategy::default()),
            store: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_batching_strategy(mut self, batching: Box<dyn BatchingStrategy>) -> Self {
        self.batching = batching;
        self
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = {
            let store = self.store.read().await;
            serde_json::to_vec_pretty(&*store)?
        };
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Merge the documents saved at `path` into this store.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = tokio::fs::read(path).await?;
        let loaded: HashMap<String, StoredDocument> = serde_json::from_slice(&bytes)?;
        self.store.write().await.extend(loaded);
        Ok(())
    }
}

#[async_trait]
impl VectorStore for SimpleVectorStore {
    fn name(&self) -> &str {
        "SimpleVectorStore"
    }

    async fn add(&self, documents: Vec<Document>) -> Result<()> {
        let embeddings = self
            .embedding_model
            .embed_documents(&documents, None, self.batching.as_ref())
            .await?;
        let mut store = self.store.write().await;
        for (document, embedding) in documents.into_iter().zip(embeddings) {
            tracing::debug!(id = %document.id(), "storing document");
            store.insert(
                document.id().to_string(),
                StoredDocument {
                    document,
                    embedding,
                },
            );
        }
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut store = self.store.write().await;
        for id in ids {
            store.remove(id);
        }
        Ok(())
    }

    async fn delete_by_filter(&self, expression: &Expression) -> Result<()> {
        self.store
            .write()
            .await
            .retain(|_, stored| !expression.matches(stored.document.metadata()));
        Ok(())
    }

    async fn similarity_search(&self, request: &SearchRequest) -> Result<Vec<Document>> {
        let query = self.embedding_model.embed(&request.query).await?;
        let store = self.store.read().await;

        let mut scored = Vec::new();
        for stored in store.values() {
            if let Some(filter) = &request.filter_expression {
                if !filter.matches(stored.document.metadata()) {
                    continue;
                }
            }
            let score = f64::from(cosine_similarity(&query, &stored.embedding)?);
            if score >= request.similarity_threshold {
                scored.push((score, &stored.document));
            }
        }
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(request.top_k)
            .map(|(score, document)| {
                document
                    .mutate()
                    .metadata(DISTANCE_METADATA_KEY, 1.0 - score)
                    .score(score)
                    .build()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Embedding, EmbeddingRequest, EmbeddingResponse, EmbeddingUsage};
    use crate::vectorstore::filter::eq;

    /// Maps text onto a 2-d vector: "cat*" points one way, everything else the other.
    struct AxisEmbedding;

    #[async_trait]
    impl EmbeddingModel for AxisEmbedding {
        async fn call(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
            let embeddings = request
                .inputs
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    let v = if t.starts_with("cat") {
                        vec![1.0, 0.1]
                    } else {
                        vec![0.1, 1.0]
                    };
                    Embedding::new(i, v)
                })
                .collect();
            Ok(EmbeddingResponse::new(embeddings, "axis".into(), EmbeddingUsage::default()))
        }
    }

    fn doc(id: &str, text: &str, kind: &str) -> Document {
        Document::builder()
            .id(id)
            .text(text)
            .metadata("kind", kind)
            .build()
            .unwrap()
    }

    async fn store() -> SimpleVectorStore {
        let store = SimpleVectorStore::new(Arc::new(AxisEmbedding));
        store
            .add(vec![
                doc("1", "cats purr", "pet"),
                doc("2", "dogs bark", "pet"),
                doc("3", "cat food", "shop"),
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_search_ranks_by_similarity() {
        let store = store().await;
        let results = store
            .similarity_search(&SearchRequest::builder().query("cat").top_k(2).build().unwrap())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|d| d.text().unwrap().starts_with("cat")));
        let first = &results[0];
        let distance = first.metadata()[DISTANCE_METADATA_KEY].as_f64().unwrap();
        assert!((distance - (1.0 - first.score().unwrap())).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_filter_and_threshold() {
        let store = store().await;
        let request = SearchRequest::builder()
            .query("cat")
            .similarity_threshold(0.9)
            .filter_expression(Some(eq("kind", "shop")))
            .build()
            .unwrap();
        let results = store.similarity_search(&request).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id(), "3");
    }

    #[tokio::test]
    async fn test_delete_by_id_and_filter() {
        let store = store().await;
        store.delete(&["1".to_string()]).await.unwrap();
        store.delete_by_filter(&eq("kind", "shop")).await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("simple-store-{}.json", uuid::Uuid::new_v4()));
        store().await.save(&path).await.unwrap();

        let restored = SimpleVectorStore::new(Arc::new(AxisEmbedding));
        restored.load(&path).await.unwrap();
        assert_eq!(restored.len().await, 3);
        let _ = std::fs::remove_file(path);
    }
}
