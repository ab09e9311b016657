//! Integration tests against a mock HTTP server

mod mock_server;

mod chat_client;
mod ollama_api;
mod qdrant_store;
