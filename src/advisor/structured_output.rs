use super::chain::{CallAdvisorChain, StreamAdvisorChain};
use super::request::{ChatClientRequest, ChatClientResponse};
use super::{Advisor, CallAdvisor, StreamAdvisor, HIGHEST_PRECEDENCE, LOWEST_PRECEDENCE};
use crate::{BoxStream, Error, ErrorContext, Result};
use async_trait::async_trait;
use jsonschema::{Draft, JSONSchema};
use schemars::JsonSchema;
use serde_json::Value;
use std::sync::Arc;

/// Validates the model's JSON answer against a schema and re-prompts on failure.
///
/// Each failed attempt appends the validation error to the original user message and calls
/// the rest of the chain again, at most `max_repeat_attempts` extra times. Responses that
/// request tool calls are passed through unvalidated.
pub struct StructuredOutputValidationAdvisor {
    order: i32,
    schema: Value,
    validator: JSONSchema,
    max_repeat_attempts: usize,
}

impl StructuredOutputValidationAdvisor {
    pub const DEFAULT_ORDER: i32 = LOWEST_PRECEDENCE - 2000;
    pub const DEFAULT_MAX_REPEAT_ATTEMPTS: usize = 3;

    /// Validate against the schema derived from `T`.
    pub fn for_type<T: JsonSchema>() -> Result<Self> {
        let schema = serde_json::to_value(schemars::schema_for!(T))?;
        Self::new(schema)
    }

    pub fn new(schema: Value) -> Result<Self> {
        Self::with_settings(schema, Self::DEFAULT_ORDER, Self::DEFAULT_MAX_REPEAT_ATTEMPTS)
    }

    pub fn with_settings(schema: Value, order: i32, max_repeat_attempts: usize) -> Result<Self> {
        if order <= HIGHEST_PRECEDENCE || order >= LOWEST_PRECEDENCE {
            return Err(Error::validation(
                "advisorOrder must be between HIGHEST_PRECEDENCE and LOWEST_PRECEDENCE",
            ));
        }
        let validator = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&schema)
            .map_err(|e| {
                Error::configuration_with_context(
                    format!("Failed to compile JSON schema: {}", e),
                    ErrorContext::new().with_source("structured_output_validation"),
                )
            })?;
        tracing::info!(schema = %schema, "generated JSON schema");
        Ok(Self {
            order,
            schema,
            validator,
            max_repeat_attempts,
        })
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// `Err` carries a human readable reason.
    fn validate(&self, response: &ChatClientResponse) -> std::result::Result<(), String> {
        let Some(text) = response
            .chat_response()
            .and_then(|c| c.result())
            .map(|g| g.text())
        else {
            tracing::warn!("ChatClientResponse is missing required json output for validation.");
            return Err("Missing required json output for validation.".to_string());
        };
        let instance: Value = serde_json::from_str(text.trim())
            .map_err(|e| format!("Invalid JSON: {}", e))?;
        let result = self.validator.validate(&instance);
        if let Err(errors) = result {
            let reasons: Vec<String> = errors
                .map(|e| format!("{}: {}", e.instance_path, e))
                .collect();
            return Err(reasons.join("; "));
        }
        Ok(())
    }
}

impl Advisor for StructuredOutputValidationAdvisor {
    fn name(&self) -> &str {
        "Structured Output Validation Advisor"
    }

    fn order(&self) -> i32 {
        self.order
    }
}

#[async_trait]
impl CallAdvisor for StructuredOutputValidationAdvisor {
    async fn advise_call(
        &self,
        request: ChatClientRequest,
        chain: &CallAdvisorChain,
    ) -> Result<ChatClientResponse> {
        let mut processed = request.copy();
        let mut attempts = 0usize;

        loop {
            attempts += 1;
            let response = chain.next_call(processed.copy()).await?;

            if response.chat_response().is_some_and(|c| c.has_tool_calls()) {
                return Ok(response);
            }
            let reason = match self.validate(&response) {
                Ok(()) => return Ok(response),
                Err(reason) => reason,
            };
            if attempts > self.max_repeat_attempts {
                return Ok(response);
            }

            tracing::warn!(attempt = attempts, reason = %reason, "JSON validation failed");
            let message = format!("Output JSON validation failed because of: {}", reason);
            let augmented = request.prompt().augment_user_message(|user| {
                user.clone().with_text(format!("{}\n{}", user.text, message))
            });
            processed = request.mutate().prompt(augmented).build()?;
        }
    }
}

impl StreamAdvisor for StructuredOutputValidationAdvisor {
    fn advise_stream(
        self: Arc<Self>,
        _request: ChatClientRequest,
        _chain: StreamAdvisorChain,
    ) -> BoxStream<'static, ChatClientResponse> {
        Box::pin(futures::stream::once(async {
            Err(Error::runtime(
                "The Structured Output Validation Advisor does not support streaming.",
            ))
        }))
    }
}
