//! Qdrant vector store over REST, embedding through Ollama, both against one mock server

use crate::mock_server::MockServerFixture;
use ai_client_rust::model::EmbeddingModel;
use ai_client_rust::types::{Document, DISTANCE_METADATA_KEY};
use ai_client_rust::vectorstore::filter::eq;
use ai_client_rust::vectorstore::{QdrantVectorStore, SearchRequest, VectorStore};
use mockito::{Matcher, Mock};
use serde_json::json;
use std::sync::Arc;

const DOC_ID: &str = "2f1e7c8a-6f0d-4b8e-9a51-3c2d1e0f9b7a";

/// The store plus the embedding mock, which must stay alive for the duration of the test.
async fn store(fixture: &MockServerFixture, initialize_schema: bool) -> (QdrantVectorStore, Mock) {
    let embed = fixture
        .mock_json(
            "POST",
            "/api/embed",
            None,
            200,
            json!({"model": "nomic-embed-text", "embeddings": [[0.5, 0.5, 0.0]]}),
        )
        .await;
    let embedding: Arc<dyn EmbeddingModel> = Arc::new(fixture.embedding_model("nomic-embed-text"));
    let store = QdrantVectorStore::builder(Arc::new(fixture.qdrant_client()))
        .embedding_model(embedding)
        .collection_name("docs")
        .initialize_schema(initialize_schema)
        .build()
        .unwrap();
    (store, embed)
}

#[tokio::test]
async fn test_add_upserts_points_with_payload() {
    let fixture = MockServerFixture::new().await;
    let (store, _embed) = store(&fixture, false).await;
    let upsert = {
        let mut server = fixture.server.lock().await;
        server
            .mock("PUT", Matcher::Regex(r"^/collections/docs/points".into()))
            .match_query(Matcher::UrlEncoded("wait".into(), "true".into()))
            .match_header("api-key", "test-key")
            .match_body(Matcher::PartialJson(json!({"points": [{
                "id": DOC_ID,
                "vector": [0.5, 0.5, 0.0],
                "payload": {"doc_content": "Rust is fast", "lang": "en", "year": 2015}
            }]})))
            .with_status(200)
            .with_body(r#"{"result": {"operation_id": 1, "status": "completed"}, "status": "ok", "time": 0.001}"#)
            .create_async()
            .await
    };

    let document = Document::builder()
        .id(DOC_ID)
        .text("Rust is fast")
        .metadata("lang", "en")
        .metadata("year", 2015)
        .build()
        .unwrap();
    store.add(vec![document]).await.unwrap();
    upsert.assert_async().await;
}

#[tokio::test]
async fn test_similarity_search_maps_points_to_documents() {
    let fixture = MockServerFixture::new().await;
    let (store, _embed) = store(&fixture, false).await;
    let _search = fixture
        .mock_json(
            "POST",
            "/collections/docs/points/search",
            Some(Matcher::PartialJson(json!({
                "limit": 2,
                "with_payload": true,
                "score_threshold": 0.5,
                "filter": {"must": [{"key": "lang", "match": {"value": "en"}}]}
            }))),
            200,
            json!({"result": [{
                "id": DOC_ID,
                "version": 3,
                "score": 0.75,
                "payload": {"doc_content": "Rust is fast", "lang": "en", "year": 2015}
            }], "status": "ok"}),
        )
        .await;

    let request = SearchRequest::builder()
        .query("fast languages")
        .top_k(2)
        .similarity_threshold(0.5)
        .filter_expression(Some(eq("lang", "en")))
        .build()
        .unwrap();
    let documents = store.similarity_search(&request).await.unwrap();
    assert_eq!(documents.len(), 1);
    let document = &documents[0];
    assert_eq!(document.id(), DOC_ID);
    assert_eq!(document.text(), Some("Rust is fast"));
    assert_eq!(document.score(), Some(0.75));
    assert_eq!(document.metadata()["year"], json!(2015));
    assert_eq!(document.metadata()[DISTANCE_METADATA_KEY], json!(0.25));
    assert!(!document.metadata().contains_key("doc_content"));
}

#[tokio::test]
async fn test_delete_by_ids() {
    let fixture = MockServerFixture::new().await;
    let (store, _embed) = store(&fixture, false).await;
    let delete = fixture
        .mock_json(
            "POST",
            Matcher::Regex(r"^/collections/docs/points/delete".into()),
            Some(Matcher::Json(json!({"points": [DOC_ID, 42]}))),
            200,
            json!({"result": {"operation_id": 2, "status": "completed"}, "status": "ok"}),
        )
        .await;

    store
        .delete(&[DOC_ID.to_string(), "42".to_string()])
        .await
        .unwrap();
    delete.assert_async().await;

    let err = store.delete(&["not-an-id".to_string()]).await.unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn test_initialize_creates_missing_collection() {
    let fixture = MockServerFixture::new().await;
    let (store, _embed) = store(&fixture, true).await;
    let _exists = fixture
        .mock_json(
            "GET",
            "/collections/docs/exists",
            None,
            200,
            json!({"result": {"exists": false}, "status": "ok"}),
        )
        .await;
    let create = fixture
        .mock_json(
            "PUT",
            "/collections/docs",
            Some(Matcher::PartialJson(json!({"vectors": {"size": 3, "distance": "Cosine"}}))),
            200,
            json!({"result": true, "status": "ok"}),
        )
        .await;

    store.initialize().await.unwrap();
    create.assert_async().await;
}

#[tokio::test]
async fn test_qdrant_error_is_propagated() {
    let fixture = MockServerFixture::new().await;
    let (store, _embed) = store(&fixture, false).await;
    let _search = fixture
        .mock_error(
            "POST",
            "/collections/docs/points/search",
            404,
            r#"{"status":{"error":"Not found: Collection `docs` doesn't exist!"}}"#,
        )
        .await;

    let err = store
        .similarity_search(&SearchRequest::new("anything"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(404));
}
