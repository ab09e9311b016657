use super::api::OllamaApi;
use super::dto::{DeleteModelRequest, PullModelRequest};
use crate::{Error, ErrorContext, Result};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// When models should be downloaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullModelStrategy {
    Always,
    WhenMissing,
    #[default]
    Never,
}

/// Model download settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelManagementOptions {
    pub pull_model_strategy: PullModelStrategy,
    /// Models pulled in addition to the configured chat / embedding model.
    pub additional_models: Vec<String>,
    #[serde(with = "secs")]
    pub timeout: Duration,
    pub max_retries: u32,
    #[serde(with = "secs")]
    pub retry_delay: Duration,
}

impl Default for ModelManagementOptions {
    fn default() -> Self {
        Self {
            pull_model_strategy: PullModelStrategy::Never,
            additional_models: Vec::new(),
            timeout: Duration::from_secs(5 * 60),
            max_retries: 0,
            retry_delay: Duration::from_secs(5),
        }
    }
}

impl ModelManagementOptions {
    pub fn with_strategy(mut self, strategy: PullModelStrategy) -> Self {
        self.pull_model_strategy = strategy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

/// `name` with the implicit `:latest` tag made explicit.
fn normalize(name: &str) -> String {
    if name.contains(':') {
        name.to_string()
    } else {
        format!("{}:latest", name)
    }
}

/// Checks for, downloads and removes models on an Ollama server.
#[derive(Clone)]
pub struct OllamaModelManager {
    api: OllamaApi,
    options: ModelManagementOptions,
}

impl OllamaModelManager {
    pub fn new(api: OllamaApi, options: ModelManagementOptions) -> Self {
        Self { api, options }
    }

    pub fn options(&self) -> &ModelManagementOptions {
        &self.options
    }

    pub async fn is_model_available(&self, name: &str) -> Result<bool> {
        let wanted = normalize(name);
        let models = self.api.list_models().await?;
        Ok(models.models.iter().any(|m| normalize(&m.name) == wanted))
    }

    pub async fn delete_model(&self, name: &str) -> Result<()> {
        if !self.is_model_available(name).await? {
            tracing::info!(model = %name, "model not present, nothing to delete");
            return Ok(());
        }
        self.api
            .delete_model(&DeleteModelRequest {
                model: name.to_string(),
            })
            .await?;
        tracing::info!(model = %name, "model deleted");
        Ok(())
    }

    /// Pull `name` according to `strategy`, waiting until the server reports success.
    ///
    /// Each attempt is bounded by the configured timeout; failed attempts are retried up
    /// to `max_retries` times.
    pub async fn pull_model(&self, name: &str, strategy: PullModelStrategy) -> Result<()> {
        Error::require_text(name, "model")?;
        match strategy {
            PullModelStrategy::Never => return Ok(()),
            PullModelStrategy::WhenMissing if self.is_model_available(name).await? => {
                tracing::debug!(model = %name, "model already available");
                return Ok(());
            }
            _ => {}
        }

        let mut attempt = 0;
        loop {
            tracing::info!(model = %name, attempt, "pulling model");
            let result = match tokio::time::timeout(self.options.timeout, self.pull_once(name)).await {
                Ok(result) => result,
                Err(_) => Err(Error::runtime_with_context(
                    format!("Pulling model {} timed out after {:?}", name, self.options.timeout),
                    ErrorContext::new().with_source("ollama_model_manager"),
                )),
            };
            match result {
                Ok(()) => break,
                Err(e) if attempt < self.options.max_retries => {
                    attempt += 1;
                    tracing::warn!(model = %name, error = %e, "model pull failed, retrying");
                    tokio::time::sleep(self.options.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }

        if !self.is_model_available(name).await? {
            return Err(Error::runtime_with_context(
                format!("Model {} is not available after pulling", name),
                ErrorContext::new().with_source("ollama_model_manager"),
            ));
        }
        tracing::info!(model = %name, "model pulled");
        Ok(())
    }

    /// Pull the configured models with the configured strategy.
    pub async fn pull_models(&self, models: &[String]) -> Result<()> {
        let strategy = self.options.pull_model_strategy;
        for model in models.iter().chain(self.options.additional_models.iter()) {
            self.pull_model(model, strategy).await?;
        }
        Ok(())
    }

    async fn pull_once(&self, name: &str) -> Result<()> {
        let mut progress = self.api.pull_model(&PullModelRequest::new(name)).await?;
        while let Some(update) = progress.next().await {
            let update = update?;
            match (update.completed, update.total) {
                (Some(done), Some(total)) if total > 0 => {
                    tracing::debug!(model = %name, status = %update.status, "{}%", done * 100 / total)
                }
                _ => tracing::debug!(model = %name, status = %update.status, "pull progress"),
            }
            if update.status == "success" {
                return Ok(());
            }
        }
        Err(Error::runtime_with_context(
            format!("Pull of model {} ended without success", name),
            ErrorContext::new().with_source("ollama_model_manager"),
        ))
    }
}
