use crate::{Error, ErrorContext, Result};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::HashMap;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_.\-]*)\}").expect("static placeholder pattern"));

/// Text with `{name}` placeholders.
///
/// Only identifier-like names are placeholders, so literal JSON such as `{"a": 1}` in a
/// template is left alone. Rendering fails if a placeholder has no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Placeholder names in order of first appearance.
    pub fn variables(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for caps in PLACEHOLDER.captures_iter(&self.template) {
            let name = caps[1].to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    pub fn render(&self, params: &HashMap<String, String>) -> Result<String> {
        let missing: Vec<String> = self
            .variables()
            .into_iter()
            .filter(|v| !params.contains_key(v))
            .collect();
        if !missing.is_empty() {
            return Err(Error::validation_with_context(
                format!(
                    "Not all variables were replaced in the template. Missing variable names are: {:?}",
                    missing
                ),
                ErrorContext::new().with_field_path("template"),
            ));
        }
        let rendered = PLACEHOLDER.replace_all(&self.template, |caps: &Captures| {
            params.get(&caps[1]).cloned().unwrap_or_default()
        });
        Ok(rendered.into_owned())
    }

    /// Render with JSON values; strings are inserted without quotes.
    pub fn render_values(&self, params: &HashMap<String, Value>) -> Result<String> {
        let params = params
            .iter()
            .map(|(k, v)| {
                let text = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), text)
            })
            .collect();
        self.render(&params)
    }
}
