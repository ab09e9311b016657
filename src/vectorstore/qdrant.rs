use super::filter::{to_qdrant_filter, Expression};
use super::{SearchRequest, VectorStore};
use crate::model::{BatchingStrategy, EmbeddingModel, TokenCountBatchingStrategy};
use crate::transport::{lookup_api_key, HttpTransport, TransportConfig};
use crate::types::{Document, Metadata, DISTANCE_METADATA_KEY};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_COLLECTION_NAME: &str = "vector_store";

/// Payload key holding the document text.
pub const DEFAULT_CONTENT_FIELD_NAME: &str = "doc_content";

/// Qdrant point id: a UUID or an unsigned integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointId {
    Num(u64),
    Uuid(String),
}

impl PointId {
    /// Parse a document id. Anything other than a UUID or an unsigned integer is rejected.
    ///
    /// UUIDs are normalized to the lowercase hyphenated form Qdrant returns, so an id stored
    /// as `{2F1E...}` or in uppercase comes back from a search in canonical form.
    pub fn parse(id: &str) -> Result<Self> {
        if let Ok(uuid) = uuid::Uuid::parse_str(id) {
            return Ok(PointId::Uuid(uuid.to_string()));
        }
        id.parse::<u64>().map(PointId::Num).map_err(|_| {
            Error::validation_with_context(
                format!("Document id '{}' is not a valid Qdrant point id", id),
                ErrorContext::new()
                    .with_field_path("document.id")
                    .with_details("expected a UUID or an unsigned integer"),
            )
        })
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointId::Num(n) => write!(f, "{}", n),
            PointId::Uuid(u) => f.write_str(u),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointStruct {
    pub id: PointId,
    pub vector: Vec<f32>,
    pub payload: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: PointId,
    #[serde(default)]
    pub version: u64,
    pub score: f64,
    #[serde(default)]
    pub payload: Option<Metadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPoints {
    pub vector: Vec<f32>,
    pub limit: usize,
    pub with_payload: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointsSelector {
    Points { points: Vec<PointId> },
    Filter { filter: Value },
}

/// The subset of the Qdrant API the vector store needs.
#[async_trait]
pub trait QdrantClient: Send + Sync {
    async fn collection_exists(&self, collection: &str) -> Result<bool>;

    async fn create_collection(&self, collection: &str, vector_size: usize) -> Result<()>;

    async fn upsert(&self, collection: &str, points: Vec<PointStruct>) -> Result<()>;

    async fn delete_points(&self, collection: &str, selector: PointsSelector) -> Result<()>;

    async fn search(&self, collection: &str, request: SearchPoints) -> Result<Vec<ScoredPoint>>;
}

#[derive(Debug, Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct ExistsResult {
    exists: bool,
}

/// [`QdrantClient`] over Qdrant's REST API.
#[derive(Clone)]
pub struct QdrantRestClient {
    http: HttpTransport,
}

impl QdrantRestClient {
    pub const DEFAULT_URL: &'static str = "http://localhost:6333";

    /// `api_key` falls back to the keyring, then `QDRANT_API_KEY`.
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        Self::with_config(url, api_key, &TransportConfig::from_env())
    }

    pub fn with_config(
        url: impl Into<String>,
        api_key: Option<String>,
        config: &TransportConfig,
    ) -> Result<Self> {
        let api_key = api_key.or_else(|| lookup_api_key("qdrant", "QDRANT_API_KEY"));
        let headers = match api_key {
            Some(key) => HttpTransport::secret_header("api-key", &key)?,
            None => HeaderMap::new(),
        };
        Ok(Self {
            http: HttpTransport::with_config(url, config, headers)?,
        })
    }
}

#[async_trait]
impl QdrantClient for QdrantRestClient {
    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        let response: QdrantResponse<ExistsResult> = self
            .http
            .get_json(&format!("/collections/{}/exists", collection))
            .await?;
        Ok(response.result.exists)
    }

    async fn create_collection(&self, collection: &str, vector_size: usize) -> Result<()> {
        let body = json!({"vectors": {"size": vector_size, "distance": "Cosine"}});
        let _: QdrantResponse<Value> = self
            .http
            .put_json(&format!("/collections/{}", collection), &body)
            .await?;
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<PointStruct>) -> Result<()> {
        let body = json!({ "points": points });
        let _: QdrantResponse<Value> = self
            .http
            .put_json(&format!("/collections/{}/points?wait=true", collection), &body)
            .await?;
        Ok(())
    }

    async fn delete_points(&self, collection: &str, selector: PointsSelector) -> Result<()> {
        let _: QdrantResponse<Value> = self
            .http
            .post_json(
                &format!("/collections/{}/points/delete?wait=true", collection),
                &selector,
            )
            .await?;
        Ok(())
    }

    async fn search(&self, collection: &str, request: SearchPoints) -> Result<Vec<ScoredPoint>> {
        let response: QdrantResponse<Vec<ScoredPoint>> = self
            .http
            .post_json(&format!("/collections/{}/points/search", collection), &request)
            .await?;
        Ok(response.result)
    }
}

/// Vector store backed by a Qdrant collection.
///
/// Document text is stored in the payload under the content field; every metadata entry
/// is stored next to it at the top level with its JSON type unchanged.
pub struct QdrantVectorStore {
    client: Arc<dyn QdrantClient>,
    embedding_model: Arc<dyn EmbeddingModel>,
    batching: Arc<dyn BatchingStrategy>,
    collection_name: String,
    content_field_name: String,
    initialize_schema: bool,
}

impl QdrantVectorStore {
    pub fn builder(client: Arc<dyn QdrantClient>) -> QdrantVectorStoreBuilder {
        QdrantVectorStoreBuilder {
            client,
            embedding_model: None,
            batching: Some(Arc::new(TokenCountBatchingStrategy::default())),
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
            content_field_name: DEFAULT_CONTENT_FIELD_NAME.to_string(),
            initialize_schema: false,
        }
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    /// Create the collection if schema initialization is on and it does not exist yet.
    pub async fn initialize(&self) -> Result<()> {
        if !self.initialize_schema {
            return Ok(());
        }
        if self.client.collection_exists(&self.collection_name).await? {
            return Ok(());
        }
        let dimensions = self.embedding_model.dimensions().await?;
        tracing::info!(
            collection = %self.collection_name,
            dimensions,
            "creating qdrant collection"
        );
        self.client
            .create_collection(&self.collection_name, dimensions)
            .await
    }

    fn to_payload(&self, document: &Document) -> Metadata {
        let mut payload = document.metadata().clone();
        payload.insert(
            self.content_field_name.clone(),
            Value::String(document.text().unwrap_or_default().to_string()),
        );
        payload
    }

    fn to_document(&self, point: ScoredPoint) -> Result<Document> {
        let mut payload = point.payload.unwrap_or_default();
        let text = match payload.remove(&self.content_field_name) {
            Some(Value::String(text)) => text,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        payload.insert(DISTANCE_METADATA_KEY.to_string(), json!(1.0 - point.score));
        Document::builder()
            .id(point.id.to_string())
            .text(text)
            .metadata_map(payload)
            .score(point.score)
            .build()
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    fn name(&self) -> &str {
        "QdrantVectorStore"
    }

    async fn add(&self, documents: Vec<Document>) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }
        // The content field shares the payload namespace with metadata.
        if let Some(document) = documents
            .iter()
            .find(|d| d.metadata().contains_key(&self.content_field_name))
        {
            return Err(Error::validation_with_context(
                format!(
                    "Metadata key '{}' of document '{}' collides with the content field",
                    self.content_field_name,
                    document.id()
                ),
                ErrorContext::new()
                    .with_field_path("document.metadata")
                    .with_source("qdrant_vector_store"),
            ));
        }
        let embeddings = self
            .embedding_model
            .embed_documents(&documents, None, self.batching.as_ref())
            .await?;
        let points = documents
            .iter()
            .zip(embeddings)
            .map(|(document, vector)| {
                Ok(PointStruct {
                    id: PointId::parse(document.id())?,
                    vector,
                    payload: self.to_payload(document),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(
            collection = %self.collection_name,
            count = points.len(),
            "upserting points"
        );
        self.client.upsert(&self.collection_name, points).await
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let points = ids
            .iter()
            .map(|id| PointId::parse(id))
            .collect::<Result<Vec<_>>>()?;
        self.client
            .delete_points(&self.collection_name, PointsSelector::Points { points })
            .await
    }

    async fn delete_by_filter(&self, expression: &Expression) -> Result<()> {
        let filter = to_qdrant_filter(expression)?;
        self.client
            .delete_points(&self.collection_name, PointsSelector::Filter { filter })
            .await
    }

    async fn similarity_search(&self, request: &SearchRequest) -> Result<Vec<Document>> {
        let vector = self.embedding_model.embed(&request.query).await?;
        let filter = request
            .filter_expression
            .as_ref()
            .map(to_qdrant_filter)
            .transpose()?;
        let search = SearchPoints {
            vector,
            limit: request.top_k,
            with_payload: true,
            score_threshold: Some(request.similarity_threshold),
            filter,
        };
        let points = self.client.search(&self.collection_name, search).await?;
        points.into_iter().map(|p| self.to_document(p)).collect()
    }
}

pub struct QdrantVectorStoreBuilder {
    client: Arc<dyn QdrantClient>,
    embedding_model: Option<Arc<dyn EmbeddingModel>>,
    batching: Option<Arc<dyn BatchingStrategy>>,
    collection_name: String,
    content_field_name: String,
    initialize_schema: bool,
}

impl QdrantVectorStoreBuilder {
    pub fn embedding_model(mut self, model: Arc<dyn EmbeddingModel>) -> Self {
        self.embedding_model = Some(model);
        self
    }

    pub fn batching_strategy(mut self, batching: Option<Arc<dyn BatchingStrategy>>) -> Self {
        self.batching = batching;
        self
    }

    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.collection_name = name.into();
        self
    }

    pub fn content_field_name(mut self, name: impl Into<String>) -> Self {
        self.content_field_name = name.into();
        self
    }

    pub fn initialize_schema(mut self, initialize: bool) -> Self {
        self.initialize_schema = initialize;
        self
    }

    pub fn build(self) -> Result<QdrantVectorStore> {
        let context = || ErrorContext::new().with_source("qdrant_vector_store");
        let embedding_model = self.embedding_model.ok_or_else(|| {
            Error::validation_with_context(
                "EmbeddingModel must be configured",
                context().with_field_path("embedding_model"),
            )
        })?;
        if self.collection_name.trim().is_empty() {
            return Err(Error::validation_with_context(
                "collectionName must not be empty",
                context().with_field_path("collection_name"),
            ));
        }
        let batching = self.batching.ok_or_else(|| {
            Error::validation_with_context(
                "BatchingStrategy must not be null",
                context().with_field_path("batching_strategy"),
            )
        })?;
        Ok(QdrantVectorStore {
            client: self.client,
            embedding_model,
            batching,
            collection_name: self.collection_name,
            content_field_name: self.content_field_name,
            initialize_schema: self.initialize_schema,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Embedding, EmbeddingRequest, EmbeddingResponse, EmbeddingUsage};
    use crate::vectorstore::filter::eq;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorded {
        upserts: Vec<PointStruct>,
        deletes: Vec<PointsSelector>,
        searches: Vec<SearchPoints>,
        created: Option<usize>,
    }

    /// In-memory double that records calls and answers searches from the upserted points.
    #[derive(Default)]
    struct FakeQdrant {
        recorded: Mutex<Recorded>,
    }

    #[async_trait]
    impl QdrantClient for FakeQdrant {
        async fn collection_exists(&self, _collection: &str) -> Result<bool> {
            Ok(self.recorded.lock().await.created.is_some())
        }

        async fn create_collection(&self, _collection: &str, vector_size: usize) -> Result<()> {
            self.recorded.lock().await.created = Some(vector_size);
            Ok(())
        }

        async fn upsert(&self, _collection: &str, points: Vec<PointStruct>) -> Result<()> {
            self.recorded.lock().await.upserts.extend(points);
            Ok(())
        }

        async fn delete_points(&self, _collection: &str, selector: PointsSelector) -> Result<()> {
            self.recorded.lock().await.deletes.push(selector);
            Ok(())
        }

        async fn search(&self, _collection: &str, request: SearchPoints) -> Result<Vec<ScoredPoint>> {
            let mut recorded = self.recorded.lock().await;
            recorded.searches.push(request);
            Ok(recorded
                .upserts
                .iter()
                .map(|p| ScoredPoint {
                    id: p.id.clone(),
                    version: 0,
                    score: 0.75,
                    payload: Some(p.payload.clone()),
                })
                .collect())
        }
    }

    struct ConstEmbedding;

    #[async_trait]
    impl EmbeddingModel for ConstEmbedding {
        async fn call(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
            let embeddings = (0..request.inputs.len())
                .map(|i| Embedding::new(i, vec![0.5, 0.5, 0.5]))
                .collect();
            Ok(EmbeddingResponse::new(embeddings, "const".into(), EmbeddingUsage::default()))
        }
    }

    fn store(client: Arc<FakeQdrant>) -> QdrantVectorStore {
        QdrantVectorStore::builder(client)
            .embedding_model(Arc::new(ConstEmbedding))
            .initialize_schema(true)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_fails_fast() {
        let client: Arc<dyn QdrantClient> = Arc::new(FakeQdrant::default());
        assert!(QdrantVectorStore::builder(client.clone()).build().is_err());
        let err = QdrantVectorStore::builder(client.clone())
            .embedding_model(Arc::new(ConstEmbedding))
            .collection_name(" ")
            .build()
            .err()
            .unwrap();
        assert!(err.is_validation());
        let err = QdrantVectorStore::builder(client)
            .embedding_model(Arc::new(ConstEmbedding))
            .batching_strategy(None)
            .build()
            .err()
            .unwrap();
        assert!(err.is_validation());
    }

    #[test]
    fn test_point_id_parsing() {
        let uuid = "6ba7b810-9dad-11d1-80b4-00c04fd430c8";
        assert_eq!(PointId::parse(uuid).unwrap(), PointId::Uuid(uuid.into()));
        assert_eq!(PointId::parse("42").unwrap(), PointId::Num(42));
        assert!(PointId::parse("not-an-id").is_err());
        assert_eq!(serde_json::to_value(PointId::Num(42)).unwrap(), json!(42));
    }

    #[test]
    fn test_point_id_normalizes_uuid_forms() {
        let canonical = PointId::Uuid("6ba7b810-9dad-11d1-80b4-00c04fd430c8".into());
        assert_eq!(
            PointId::parse("6BA7B810-9DAD-11D1-80B4-00C04FD430C8").unwrap(),
            canonical
        );
        assert_eq!(
            PointId::parse("{6ba7b810-9dad-11d1-80b4-00c04fd430c8}").unwrap(),
            canonical
        );
        assert_eq!(
            PointId::parse("6ba7b8109dad11d180b400c04fd430c8").unwrap(),
            canonical
        );
    }

    #[tokio::test]
    async fn test_add_rejects_metadata_shadowing_content_field() {
        let client = Arc::new(FakeQdrant::default());
        let store = store(client.clone());
        let document = Document::builder()
            .id(uuid::Uuid::new_v4().to_string())
            .text("real content")
            .metadata("doc_content", "shadow")
            .build()
            .unwrap();

        let err = store.add(vec![document]).await.unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("doc_content"));
        assert!(client.recorded.lock().await.upserts.is_empty());
    }

    #[tokio::test]
    async fn test_metadata_types_round_trip() {
        let client = Arc::new(FakeQdrant::default());
        let store = store(client.clone());
        store.initialize().await.unwrap();
        assert_eq!(client.recorded.lock().await.created, Some(3));

        let id = uuid::Uuid::new_v4().to_string();
        let document = Document::builder()
            .id(id.clone())
            .text("Spring AI rocks!!")
            .metadata("name", "spring")
            .metadata("rating", 4.5)
            .metadata("count", 3)
            .metadata("active", true)
            .build()
            .unwrap();
        store.add(vec![document]).await.unwrap();

        let payload = client.recorded.lock().await.upserts[0].payload.clone();
        assert_eq!(payload["doc_content"], json!("Spring AI rocks!!"));
        assert_eq!(payload["rating"], json!(4.5));
        assert!(payload["count"].is_u64());
        assert_eq!(payload["active"], json!(true));

        let results = store
            .similarity_search(&SearchRequest::new("spring"))
            .await
            .unwrap();
        let found = &results[0];
        assert_eq!(found.id(), id);
        assert_eq!(found.text(), Some("Spring AI rocks!!"));
        assert_eq!(found.metadata()["name"], json!("spring"));
        assert_eq!(found.metadata()["rating"], json!(4.5));
        assert_eq!(found.metadata()["active"], json!(true));
        assert_eq!(found.metadata()[DISTANCE_METADATA_KEY], json!(0.25));
        assert!(!found.metadata().contains_key("doc_content"));
    }

    #[tokio::test]
    async fn test_search_sends_threshold_and_filter() {
        let client = Arc::new(FakeQdrant::default());
        let store = store(client.clone());
        let request = SearchRequest::builder()
            .query("q")
            .top_k(2)
            .similarity_threshold(0.5)
            .filter_expression(Some(eq("name", "spring")))
            .build()
            .unwrap();
        store.similarity_search(&request).await.unwrap();

        let recorded = client.recorded.lock().await;
        let search = &recorded.searches[0];
        assert_eq!(search.limit, 2);
        assert_eq!(search.score_threshold, Some(0.5));
        assert_eq!(
            search.filter,
            Some(json!({"must": [{"key": "name", "match": {"value": "spring"}}]}))
        );
    }

    #[tokio::test]
    async fn test_delete_selectors() {
        let client = Arc::new(FakeQdrant::default());
        let store = store(client.clone());
        store.delete(&["7".to_string()]).await.unwrap();
        store.delete_by_filter(&eq("name", "x")).await.unwrap();

        let recorded = client.recorded.lock().await;
        assert_eq!(
            serde_json::to_value(&recorded.deletes[0]).unwrap(),
            json!({"points": [7]})
        );
        assert!(matches!(recorded.deletes[1], PointsSelector::Filter { .. }));
    }
}
