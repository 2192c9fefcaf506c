//! Tools connected to the agent loop.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::warn;

use crate::types::ToolDefinition;

/// A callable tool the model may request.
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> &ToolDefinition;

    /// Run the tool with the model-supplied arguments and return its observation.
    async fn invoke(&self, input: Value) -> Result<Value>;
}

/// Handler signature for [`FnTool`].
pub type ToolHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Tool backed by an async closure.
pub struct FnTool {
    definition: ToolDefinition,
    handler: ToolHandler,
}

impl FnTool {
    pub fn new(definition: ToolDefinition, handler: ToolHandler) -> Self {
        Self {
            definition,
            handler,
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn invoke(&self, input: Value) -> Result<Value> {
        (self.handler)(input).await
    }
}

/// Name index over the connected tools.
#[derive(Default, Clone)]
pub struct ToolBox {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<String, usize>,
}

impl ToolBox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. The first registration of a name wins.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name.clone();
        if self.by_name.contains_key(&name) {
            warn!(tool = %name, "duplicate tool name, keeping first registration");
            return;
        }
        self.by_name.insert(name, self.tools.len());
        self.tools.push(tool);
    }

    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.by_name.get(name).map(|&i| &self.tools[i])
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition().clone()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools
            .iter()
            .map(|t| t.definition().name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
