use serde::{Deserialize, Serialize};

/// Portable generation parameters understood by every chat model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

impl SamplingOptions {
    /// Field-wise merge: a value set on `overrides` wins, otherwise `self` is kept.
    pub fn merge(&self, overrides: &SamplingOptions) -> SamplingOptions {
        SamplingOptions {
            model: overrides.model.clone().or_else(|| self.model.clone()),
            frequency_penalty: overrides.frequency_penalty.or(self.frequency_penalty),
            max_tokens: overrides.max_tokens.or(self.max_tokens),
            presence_penalty: overrides.presence_penalty.or(self.presence_penalty),
            stop_sequences: overrides
                .stop_sequences
                .clone()
                .or_else(|| self.stop_sequences.clone()),
            temperature: overrides.temperature.or(self.temperature),
            top_k: overrides.top_k.or(self.top_k),
            top_p: overrides.top_p.or(self.top_p),
        }
    }
}
