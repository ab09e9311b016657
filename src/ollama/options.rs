use super::think::ThinkOption;
use crate::options::{
    ChatOptions, EmbeddingOptions, SamplingOptions, StructuredOutputOptions, ToolCallingOptions,
};
use crate::tool::ToolCallback;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Keys that are request-level fields rather than entries of the `options` map.
pub const NON_SUPPORTED_FIELDS: [&str; 5] = ["model", "format", "keep_alive", "truncate", "think"];

/// Every parameter Ollama accepts, plus the portable tool-calling and structured-output
/// capabilities (never serialized).
///
/// See <https://github.com/ollama/ollama/blob/main/docs/modelfile.md#valid-parameters-and-values>.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// `"json"` or a JSON schema.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<Value>,
    /// How long the model stays loaded, e.g. `"5m"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncate: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub think: Option<ThinkOption>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub numa: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_batch: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_gpu: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_gpu: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_vram: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub f16_kv: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logits_all: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vocab_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_mmap: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_mlock: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_thread: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_keep: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    /// Maximum tokens to generate; `-1` is unlimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tfs_z: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typical_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat_last_n: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirostat: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirostat_tau: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirostat_eta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub penalize_newline: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,

    /// Output size of embedding models that support truncating their vectors.
    #[serde(skip)]
    pub dimensions: Option<u32>,
    #[serde(skip)]
    pub tool_calling: ToolCallingOptions,
    #[serde(skip)]
    pub structured_output: StructuredOutputOptions,
}

/// `$field: overrides.$field or self.$field` for every listed field.
macro_rules! merge_fields {
    ($base:expr, $overrides:expr; $($field:ident),* $(,)?) => {
        OllamaOptions {
            $($field: $overrides.$field.clone().or_else(|| $base.$field.clone()),)*
            tool_calling: $base.tool_calling.merge(&$overrides.tool_calling),
            structured_output: StructuredOutputOptions {
                output_schema: $overrides
                    .structured_output
                    .output_schema
                    .clone()
                    .or_else(|| $base.structured_output.output_schema.clone()),
            },
        }
    };
}

impl OllamaOptions {
    pub fn builder() -> OllamaOptionsBuilder {
        OllamaOptionsBuilder::default()
    }

    /// Serialize every set field into a flat map (capabilities excluded).
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Drop keys that Ollama expects at request level rather than in `options`.
    pub fn filter_non_supported_fields(mut map: Map<String, Value>) -> Map<String, Value> {
        for field in NON_SUPPORTED_FIELDS {
            map.remove(field);
        }
        map
    }

    /// The request `options` map.
    pub fn to_request_options(&self) -> Map<String, Value> {
        Self::filter_non_supported_fields(self.to_map())
    }

    /// Convert any options object; Ollama options are copied as they are.
    pub fn from_options(options: &dyn ChatOptions) -> OllamaOptions {
        if let Some(ollama) = options.as_any().downcast_ref::<OllamaOptions>() {
            return ollama.clone();
        }
        let sampling = options.sampling();
        OllamaOptions {
            model: sampling.model,
            frequency_penalty: sampling.frequency_penalty,
            num_predict: sampling.max_tokens.and_then(|n| i32::try_from(n).ok()),
            presence_penalty: sampling.presence_penalty,
            stop: sampling.stop_sequences,
            temperature: sampling.temperature,
            top_k: sampling.top_k,
            top_p: sampling.top_p,
            tool_calling: options.tool_calling().cloned().unwrap_or_default(),
            structured_output: options.structured_output().cloned().unwrap_or_default(),
            ..Default::default()
        }
    }

    /// Field-wise merge; a value set on `overrides` wins.
    pub fn merge(&self, overrides: &OllamaOptions) -> OllamaOptions {
        merge_fields!(self, overrides;
            model, format, keep_alive, truncate, think,
            numa, num_ctx, num_batch, num_gpu, main_gpu, low_vram, f16_kv, logits_all,
            vocab_only, use_mmap, use_mlock, num_thread,
            num_keep, seed, num_predict, top_k, top_p, min_p, tfs_z, typical_p,
            repeat_last_n, temperature, repeat_penalty, presence_penalty, frequency_penalty,
            mirostat, mirostat_tau, mirostat_eta, penalize_newline, stop,
            dimensions,
        )
    }

    /// The `format` to send: an explicit format, else the structured-output schema.
    pub fn effective_format(&self) -> Option<Value> {
        self.format
            .clone()
            .or_else(|| self.structured_output.output_schema.clone())
    }
}

impl ChatOptions for OllamaOptions {
    fn sampling(&self) -> SamplingOptions {
        SamplingOptions {
            model: self.model.clone(),
            frequency_penalty: self.frequency_penalty,
            max_tokens: self.num_predict.and_then(|n| u32::try_from(n).ok()),
            presence_penalty: self.presence_penalty,
            stop_sequences: self.stop.clone(),
            temperature: self.temperature,
            top_k: self.top_k,
            top_p: self.top_p,
        }
    }

    fn tool_calling(&self) -> Option<&ToolCallingOptions> {
        Some(&self.tool_calling)
    }

    fn tool_calling_mut(&mut self) -> Option<&mut ToolCallingOptions> {
        Some(&mut self.tool_calling)
    }

    fn structured_output(&self) -> Option<&StructuredOutputOptions> {
        Some(&self.structured_output)
    }

    fn structured_output_mut(&mut self) -> Option<&mut StructuredOutputOptions> {
        Some(&mut self.structured_output)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_options(&self) -> Box<dyn ChatOptions> {
        Box::new(self.clone())
    }

    fn merge_with(&self, overrides: &dyn ChatOptions) -> Box<dyn ChatOptions> {
        Box::new(self.merge(&OllamaOptions::from_options(overrides)))
    }
}

impl EmbeddingOptions for OllamaOptions {
    fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    fn dimensions(&self) -> Option<u32> {
        self.dimensions
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_options(&self) -> Box<dyn EmbeddingOptions> {
        Box::new(self.clone())
    }
}

#[derive(Debug, Default)]
pub struct OllamaOptionsBuilder {
    options: OllamaOptions,
}

macro_rules! setters {
    ($($field:ident: $ty:ty),* $(,)?) => {
        impl OllamaOptionsBuilder {
            $(
                pub fn $field(mut self, value: $ty) -> Self {
                    self.options.$field = Some(value);
                    self
                }
            )*
        }
    };
}

setters! {
    truncate: bool, think: ThinkOption,
    numa: bool, num_ctx: u32, num_batch: u32, num_gpu: i32, main_gpu: i32, low_vram: bool,
    f16_kv: bool, logits_all: bool, vocab_only: bool, use_mmap: bool, use_mlock: bool,
    num_thread: u32, num_keep: i32, seed: i64, num_predict: i32, top_k: u32, top_p: f64,
    min_p: f64, tfs_z: f64, typical_p: f64, repeat_last_n: i32, temperature: f64,
    repeat_penalty: f64, presence_penalty: f64, frequency_penalty: f64, mirostat: u32,
    mirostat_tau: f64, mirostat_eta: f64, penalize_newline: bool, stop: Vec<String>,
    dimensions: u32, format: Value,
}

impl OllamaOptionsBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.options.model = Some(model.into());
        self
    }

    pub fn keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.options.keep_alive = Some(keep_alive.into());
        self
    }

    /// Shorthand for `format("json")`.
    pub fn json_format(self) -> Self {
        self.format(Value::String("json".into()))
    }

    pub fn output_schema(mut self, schema: Value) -> Self {
        self.options.structured_output.output_schema = Some(schema);
        self
    }

    pub fn tool_callbacks(mut self, callbacks: Vec<Arc<dyn ToolCallback>>) -> Self {
        self.options.tool_calling.tool_callbacks = callbacks;
        self
    }

    pub fn tool_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.tool_calling.tool_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn tool_context(mut self, context: HashMap<String, Value>) -> Self {
        self.options.tool_calling.tool_context = context;
        self
    }

    pub fn internal_tool_execution_enabled(mut self, enabled: bool) -> Self {
        self.options.tool_calling.internal_tool_execution_enabled = Some(enabled);
        self
    }

    pub fn build(self) -> OllamaOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::DefaultChatOptions;
    use serde_json::json;

    #[test]
    fn test_non_supported_fields_are_filtered() {
        let options = OllamaOptions::builder()
            .model("llama3.2")
            .json_format()
            .keep_alive("5m")
            .truncate(true)
            .think(ThinkOption::ENABLED)
            .temperature(0.4)
            .num_ctx(4096)
            .build();

        let map = options.to_map();
        assert_eq!(map["model"], "llama3.2");
        assert_eq!(map["think"], json!(true));

        let filtered = OllamaOptions::filter_non_supported_fields(map);
        for field in NON_SUPPORTED_FIELDS {
            assert!(!filtered.contains_key(field), "{} should be filtered", field);
        }
        assert_eq!(filtered["temperature"], json!(0.4));
        assert_eq!(filtered["num_ctx"], json!(4096));
    }

    #[test]
    fn test_from_portable_options() {
        let portable = DefaultChatOptions::builder()
            .model("qwen3")
            .max_tokens(128)
            .stop_sequences(vec!["END".into()])
            .tool_names(["clock"])
            .build();
        let options = OllamaOptions::from_options(&portable);
        assert_eq!(options.model.as_deref(), Some("qwen3"));
        assert_eq!(options.num_predict, Some(128));
        assert_eq!(options.stop, Some(vec!["END".to_string()]));
        assert!(options.tool_calling.tool_names.contains("clock"));

        let map = OllamaOptions::filter_non_supported_fields(options.to_map());
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["num_predict", "stop"]);
    }

    #[test]
    fn test_merge_override_wins_if_set() {
        let defaults = OllamaOptions::builder()
            .model("llama3.2")
            .temperature(0.8)
            .mirostat(1)
            .build();
        let overrides = OllamaOptions::builder().temperature(0.1).seed(42).build();
        let merged = defaults.merge(&overrides);
        assert_eq!(merged.model.as_deref(), Some("llama3.2"));
        assert_eq!(merged.temperature, Some(0.1));
        assert_eq!(merged.mirostat, Some(1));
        assert_eq!(merged.seed, Some(42));
    }

    #[test]
    fn test_merge_with_portable_overrides_keeps_vendor_fields() {
        let defaults: Box<dyn ChatOptions> =
            Box::new(OllamaOptions::builder().model("llama3.2").num_gpu(1).build());
        let merged = defaults.merge_with(&DefaultChatOptions::builder().temperature(0.0).build());
        let merged = merged.as_any().downcast_ref::<OllamaOptions>().unwrap();
        assert_eq!(merged.num_gpu, Some(1));
        assert_eq!(merged.temperature, Some(0.0));
    }

    #[test]
    fn test_deserialize_from_config() {
        let options: OllamaOptions =
            serde_json::from_value(json!({"model": "llama3.2", "think": "low", "top_k": 20})).unwrap();
        assert_eq!(options.think, Some(ThinkOption::low()));
        assert_eq!(options.top_k, Some(20));
    }
}
