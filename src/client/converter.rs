use crate::{Error, ErrorContext, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$").expect("static fence pattern"));

/// Converts a model answer into `T` using a JSON schema derived from `T`.
///
/// [`format`](Self::format) yields the instructions appended to the user message; the
/// answer may come back wrapped in a Markdown code fence, which is stripped before parsing.
pub struct BeanOutputConverter<T> {
    schema: Value,
    _marker: PhantomData<fn() -> T>,
}

impl<T: JsonSchema + DeserializeOwned> BeanOutputConverter<T> {
    pub fn new() -> Self {
        let schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null);
        Self {
            schema,
            _marker: PhantomData,
        }
    }

    pub fn json_schema(&self) -> &Value {
        &self.schema
    }

    pub fn format(&self) -> String {
        let schema = serde_json::to_string_pretty(&self.schema).unwrap_or_default();
        format!(
            "Your response should be in JSON format.\n\
             Do not include any explanations, only provide a RFC8259 compliant JSON response following this format without deviation.\n\
             Do not include markdown code blocks in your response.\n\
             Remove the ```json markdown from the output.\n\
             Here is the JSON Schema instance your output must adhere to:\n\
             ```{}```\n",
            schema
        )
    }

    pub fn convert(&self, text: &str) -> Result<T> {
        let json = strip_fence(text);
        serde_json::from_str(json).map_err(|e| {
            Error::runtime_with_context(
                format!("Could not parse the given text to the desired target type: {}", e),
                ErrorContext::new()
                    .with_source("output_converter")
                    .with_details(json.chars().take(200).collect::<String>()),
            )
        })
    }
}

impl<T: JsonSchema + DeserializeOwned> Default for BeanOutputConverter<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_fence(text: &str) -> &str {
    match FENCED_JSON.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => text.trim(),
    }
}
