//! 配置模块：从 YAML 文件与环境变量加载 Ollama 与 Qdrant 的连接和默认选项。
//!
//! ```yaml
//! ollama:
//!   base_url: http://localhost:11434
//!   timeout_secs: 120
//!   chat:
//!     model: llama3.2
//!     temperature: 0.7
//!   init:
//!     pull_model_strategy: when_missing
//! qdrant:
//!   url: http://localhost:6333
//!   collection_name: docs
//!   initialize_schema: true
//! ```

use crate::transport::TransportConfig;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

#[cfg(feature = "ollama")]
use crate::ollama::{
    ModelManagementOptions, OllamaApi, OllamaChatModel, OllamaEmbeddingModel, OllamaOptions,
    DEFAULT_BASE_URL,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    #[cfg(feature = "ollama")]
    pub ollama: OllamaConfig,
    #[cfg(feature = "qdrant")]
    pub qdrant: QdrantConfig,
}

impl AiConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::configuration_with_context(
                format!("Failed to read config file: {}", e),
                ErrorContext::new().with_source(path.to_string_lossy().to_string()),
            )
        })?;
        Self::from_yaml_str(&content)
    }

    /// Apply `OLLAMA_BASE_URL`, `QDRANT_URL`, `QDRANT_API_KEY` and `AI_HTTP_TIMEOUT_SECS`.
    pub fn with_env_overrides(mut self) -> Self {
        let timeout_secs = env::var("AI_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok());
        #[cfg(feature = "ollama")]
        {
            if let Ok(url) = env::var("OLLAMA_BASE_URL") {
                self.ollama.base_url = url;
            }
            if timeout_secs.is_some() {
                self.ollama.timeout_secs = timeout_secs;
            }
        }
        #[cfg(feature = "qdrant")]
        {
            if let Ok(url) = env::var("QDRANT_URL") {
                self.qdrant.url = url;
            }
            if let Ok(key) = env::var("QDRANT_API_KEY") {
                self.qdrant.api_key = Some(key);
            }
            if timeout_secs.is_some() {
                self.qdrant.timeout_secs = timeout_secs;
            }
        }
        let _ = timeout_secs;
        self
    }
}

fn transport_config(timeout_secs: Option<u64>) -> TransportConfig {
    let config = TransportConfig::from_env();
    match timeout_secs {
        Some(secs) => config.with_timeout(Duration::from_secs(secs)),
        None => config,
    }
}

#[cfg(feature = "ollama")]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    pub timeout_secs: Option<u64>,
    pub chat: OllamaOptions,
    pub embedding: OllamaOptions,
    pub init: ModelManagementOptions,
}

#[cfg(feature = "ollama")]
impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: None,
            chat: OllamaOptions::default(),
            embedding: OllamaOptions::default(),
            init: ModelManagementOptions::default(),
        }
    }
}

#[cfg(feature = "ollama")]
impl OllamaConfig {
    pub fn api(&self) -> Result<OllamaApi> {
        OllamaApi::with_config(&self.base_url, &transport_config(self.timeout_secs))
    }

    pub fn chat_model(&self) -> Result<OllamaChatModel> {
        OllamaChatModel::builder()
            .api(self.api()?)
            .default_options(self.chat.clone())
            .model_management(self.init.clone())
            .build()
    }

    pub fn embedding_model(&self) -> Result<OllamaEmbeddingModel> {
        OllamaEmbeddingModel::builder()
            .api(self.api()?)
            .default_options(self.embedding.clone())
            .model_management(self.init.clone())
            .build()
    }
}

#[cfg(feature = "qdrant")]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QdrantConfig {
    pub url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
    pub collection_name: String,
    pub initialize_schema: bool,
    pub content_field_name: String,
}

#[cfg(feature = "qdrant")]
impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: crate::vectorstore::QdrantRestClient::DEFAULT_URL.to_string(),
            api_key: None,
            timeout_secs: None,
            collection_name: crate::vectorstore::DEFAULT_COLLECTION_NAME.to_string(),
            initialize_schema: false,
            content_field_name: crate::vectorstore::DEFAULT_CONTENT_FIELD_NAME.to_string(),
        }
    }
}

#[cfg(feature = "qdrant")]
impl QdrantConfig {
    pub fn client(&self) -> Result<crate::vectorstore::QdrantRestClient> {
        crate::vectorstore::QdrantRestClient::with_config(
            &self.url,
            self.api_key.clone(),
            &transport_config(self.timeout_secs),
        )
    }

    pub fn vector_store(
        &self,
        embedding_model: std::sync::Arc<dyn crate::model::EmbeddingModel>,
    ) -> Result<crate::vectorstore::QdrantVectorStore> {
        crate::vectorstore::QdrantVectorStore::builder(std::sync::Arc::new(self.client()?))
            .embedding_model(embedding_model)
            .collection_name(&self.collection_name)
            .content_field_name(&self.content_field_name)
            .initialize_schema(self.initialize_schema)
            .build()
    }
}

#[cfg(all(test, feature = "ollama", feature = "qdrant"))]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AiConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config.ollama.base_url, "http://localhost:11434");
        assert_eq!(config.qdrant.url, "http://localhost:6333");
        assert_eq!(config.qdrant.collection_name, "vector_store");
        assert_eq!(config.qdrant.content_field_name, "doc_content");
        assert!(!config.qdrant.initialize_schema);
    }

    #[test]
    fn test_sections_are_parsed() {
        let config = AiConfig::from_yaml_str(
            r#"
ollama:
  base_url: http://ollama:11434
  timeout_secs: 120
  chat:
    model: llama3.2
    temperature: 0.7
    num_ctx: 4096
  embedding:
    model: nomic-embed-text
  init:
    pull_model_strategy: when_missing
    additional_models: [qwen2.5]
qdrant:
  collection_name: docs
  initialize_schema: true
"#,
        )
        .unwrap();
        assert_eq!(config.ollama.base_url, "http://ollama:11434");
        assert_eq!(config.ollama.timeout_secs, Some(120));
        assert_eq!(config.ollama.chat.model.as_deref(), Some("llama3.2"));
        assert_eq!(config.ollama.chat.num_ctx, Some(4096));
        assert_eq!(config.ollama.embedding.model.as_deref(), Some("nomic-embed-text"));
        assert_eq!(config.ollama.init.additional_models, vec!["qwen2.5".to_string()]);
        assert_eq!(config.qdrant.collection_name, "docs");
        assert!(config.qdrant.initialize_schema);

        let chat = config.ollama.chat_model().unwrap();
        assert_eq!(chat.options().temperature, Some(0.7));
        assert_eq!(chat.api().base_url(), "http://ollama:11434");
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        assert!(matches!(
            AiConfig::from_yaml_str("ollama: [1, 2"),
            Err(Error::Yaml(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_file_is_configuration_error() {
        let err = AiConfig::from_file("/definitely/not/here.yaml").await.unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }
}
