use super::api::{OllamaApi, DEFAULT_BASE_URL};
use super::dto::EmbedRequest;
use super::model_manager::{ModelManagementOptions, OllamaModelManager};
use super::options::OllamaOptions;
use crate::model::{Embedding, EmbeddingModel, EmbeddingRequest, EmbeddingResponse, EmbeddingUsage};
use crate::options::EmbeddingOptions;
use crate::Result;
use async_trait::async_trait;

pub const DEFAULT_EMBEDDING_MODEL: &str = "mxbai-embed-large";

/// Embedding model backed by `/api/embed`.
#[derive(Clone)]
pub struct OllamaEmbeddingModel {
    api: OllamaApi,
    default_options: OllamaOptions,
    model_management: ModelManagementOptions,
}

impl OllamaEmbeddingModel {
    pub fn builder() -> OllamaEmbeddingModelBuilder {
        OllamaEmbeddingModelBuilder::default()
    }

    pub fn options(&self) -> &OllamaOptions {
        &self.default_options
    }

    pub async fn initialize(&self) -> Result<()> {
        let manager = OllamaModelManager::new(self.api.clone(), self.model_management.clone());
        let models: Vec<String> = self.default_options.model.iter().cloned().collect();
        manager.pull_models(&models).await
    }

    fn merged_options(&self, runtime: Option<&dyn EmbeddingOptions>) -> OllamaOptions {
        let Some(runtime) = runtime else {
            return self.default_options.clone();
        };
        let overrides = match runtime.as_any().downcast_ref::<OllamaOptions>() {
            Some(ollama) => ollama.clone(),
            None => OllamaOptions {
                model: runtime.model().map(str::to_string),
                dimensions: runtime.dimensions(),
                ..Default::default()
            },
        };
        self.default_options.merge(&overrides)
    }

    pub fn create_request(&self, request: &EmbeddingRequest) -> EmbedRequest {
        let options = self.merged_options(request.options.as_deref());
        let mut embed = EmbedRequest::new(
            options.model.clone().unwrap_or_default(),
            request.inputs.clone(),
        );
        embed.keep_alive = options.keep_alive.clone();
        embed.truncate = options.truncate;
        embed.dimensions = options.dimensions;
        embed.options = options.to_request_options();
        embed
    }
}

#[async_trait]
impl EmbeddingModel for OllamaEmbeddingModel {
    async fn call(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        let embed = self.create_request(&request);
        tracing::debug!(model = %embed.model, inputs = embed.input.len(), "ollama embed");
        let response = self.api.embed(&embed).await?;
        let embeddings = response
            .embeddings
            .into_iter()
            .enumerate()
            .map(|(index, output)| Embedding::new(index, output))
            .collect();
        Ok(EmbeddingResponse::new(
            embeddings,
            response.model,
            EmbeddingUsage::new(response.prompt_eval_count.unwrap_or(0)),
        ))
    }
}

#[derive(Default)]
pub struct OllamaEmbeddingModelBuilder {
    api: Option<OllamaApi>,
    default_options: Option<OllamaOptions>,
    model_management: ModelManagementOptions,
}

impl OllamaEmbeddingModelBuilder {
    pub fn api(mut self, api: OllamaApi) -> Self {
        self.api = Some(api);
        self
    }

    pub fn default_options(mut self, options: OllamaOptions) -> Self {
        self.default_options = Some(options);
        self
    }

    pub fn model_management(mut self, options: ModelManagementOptions) -> Self {
        self.model_management = options;
        self
    }

    pub fn build(self) -> Result<OllamaEmbeddingModel> {
        let api = match self.api {
            Some(api) => api,
            None => OllamaApi::new(DEFAULT_BASE_URL)?,
        };
        let mut default_options = self.default_options.unwrap_or_default();
        if default_options.model.as_deref().map_or(true, str::is_empty) {
            default_options.model = Some(DEFAULT_EMBEDDING_MODEL.to_string());
        }
        Ok(OllamaEmbeddingModel {
            api,
            default_options,
            model_management: self.model_management,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn model() -> OllamaEmbeddingModel {
        OllamaEmbeddingModel::builder()
            .api(OllamaApi::new("http://127.0.0.1:9").unwrap())
            .default_options(OllamaOptions::builder().num_ctx(2048).keep_alive("1m").build())
            .build()
            .unwrap()
    }

    #[test]
    fn test_request_from_defaults() {
        let request = model().create_request(&EmbeddingRequest::single("hello"));
        assert_eq!(request.model, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(request.input, vec!["hello".to_string()]);
        assert_eq!(request.keep_alive.as_deref(), Some("1m"));
        assert_eq!(request.options.get("num_ctx"), Some(&json!(2048)));
        assert!(request.dimensions.is_none());
    }

    #[test]
    fn test_runtime_options_override_model_and_dimensions() {
        let runtime = OllamaOptions::builder().model("nomic-embed-text").dimensions(256).build();
        let request = model()
            .create_request(&EmbeddingRequest::single("hello").with_options(Box::new(runtime)));
        assert_eq!(request.model, "nomic-embed-text");
        assert_eq!(request.dimensions, Some(256));
        assert!(!request.options.contains_key("dimensions"));
        assert_eq!(request.options.get("num_ctx"), Some(&json!(2048)));
    }
}
