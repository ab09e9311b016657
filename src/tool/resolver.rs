use super::ToolCallback;
use std::collections::HashMap;
use std::sync::Arc;

/// Looks up tool callbacks by name.
pub trait ToolCallbackResolver: Send + Sync {
    fn resolve(&self, tool_name: &str) -> Option<Arc<dyn ToolCallback>>;
}

/// Resolver over a fixed set of callbacks.
#[derive(Clone, Default)]
pub struct StaticToolCallbackResolver {
    callbacks: HashMap<String, Arc<dyn ToolCallback>>,
}

impl StaticToolCallbackResolver {
    pub fn new(callbacks: impl IntoIterator<Item = Arc<dyn ToolCallback>>) -> Self {
        Self {
            callbacks: callbacks
                .into_iter()
                .map(|c| (c.definition().name, c))
                .collect(),
        }
    }

    pub fn register(&mut self, callback: Arc<dyn ToolCallback>) {
        self.callbacks.insert(callback.definition().name, callback);
    }
}

impl ToolCallbackResolver for StaticToolCallbackResolver {
    fn resolve(&self, tool_name: &str) -> Option<Arc<dyn ToolCallback>> {
        self.callbacks.get(tool_name).cloned()
    }
}
