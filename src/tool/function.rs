use super::{ToolCallback, ToolContext, ToolDefinition, ToolMetadata};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

type ToolFn = Arc<dyn Fn(Value, ToolContext) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Tool backed by a Rust closure; the input schema is derived with `schemars`.
#[derive(Clone)]
pub struct FunctionToolCallback {
    definition: ToolDefinition,
    metadata: ToolMetadata,
    function: ToolFn,
}

impl FunctionToolCallback {
    /// Async tool taking a typed input and the tool context.
    pub fn new<I, O, F, Fut>(name: impl Into<String>, description: impl Into<String>, f: F) -> Self
    where
        I: DeserializeOwned + JsonSchema + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(I, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
    {
        let name = name.into();
        let tool_name = name.clone();
        let f = Arc::new(f);
        let function: ToolFn = Arc::new(move |args: Value, ctx: ToolContext| {
            let f = f.clone();
            let tool_name = tool_name.clone();
            async move {
                let input: I = serde_json::from_value(args).map_err(|e| {
                    Error::runtime_with_context(
                        format!("Invalid arguments for tool '{}': {}", tool_name, e),
                        ErrorContext::new().with_source("function_tool_callback"),
                    )
                })?;
                let output = f(input, ctx).await?;
                Ok(serde_json::to_value(output)?)
            }
            .boxed()
        });

        let schema = serde_json::to_value(schemars::schema_for!(I))
            .unwrap_or_else(|_| serde_json::json!({"type": "object"}));

        Self {
            definition: ToolDefinition::new(name, description, schema),
            metadata: ToolMetadata::default(),
            function,
        }
    }

    /// Synchronous tool that ignores the tool context.
    pub fn from_fn<I, O, F>(name: impl Into<String>, description: impl Into<String>, f: F) -> Self
    where
        I: DeserializeOwned + JsonSchema + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(I) -> Result<O> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::new(name, description, move |input: I, _ctx| {
            let result = f(input);
            async move { result }
        })
    }

    pub fn with_return_direct(mut self, return_direct: bool) -> Self {
        self.metadata.return_direct = return_direct;
        self
    }

    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.definition.input_schema = schema;
        self
    }
}

#[async_trait]
impl ToolCallback for FunctionToolCallback {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    fn metadata(&self) -> ToolMetadata {
        self.metadata
    }

    async fn call(&self, arguments: &str, context: &ToolContext) -> Result<String> {
        let arguments = if arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(arguments)?
        };
        tracing::debug!(tool = %self.definition.name, "calling function tool");
        let output = (self.function)(arguments, context.clone()).await?;
        Ok(match output {
            Value::String(s) => s,
            other => other.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    struct AddInput {
        a: i64,
        b: i64,
    }

    fn adder() -> FunctionToolCallback {
        FunctionToolCallback::from_fn("add", "Add two numbers", |input: AddInput| {
            Ok(input.a + input.b)
        })
    }

    #[tokio::test]
    async fn test_call_deserializes_arguments() {
        let result = adder()
            .call(r#"{"a": 2, "b": 3}"#, &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(result, "5");
    }

    #[test]
    fn test_schema_is_derived_from_input_type() {
        let def = adder().definition();
        assert_eq!(def.name, "add");
        assert!(def.input_schema["properties"]["a"].is_object());
    }

    #[tokio::test]
    async fn test_string_output_is_not_quoted() {
        #[derive(Deserialize, JsonSchema)]
        struct Empty {}
        let tool = FunctionToolCallback::from_fn("now", "Current time", |_: Empty| {
            Ok("12:00".to_string())
        })
        .with_return_direct(true);
        assert!(tool.metadata().return_direct);
        assert_eq!(tool.call("", &ToolContext::default()).await.unwrap(), "12:00");
    }

    #[tokio::test]
    async fn test_invalid_arguments_is_runtime_error() {
        let err = adder()
            .call(r#"{"a": "x"}"#, &ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Runtime { .. }));
    }
}
