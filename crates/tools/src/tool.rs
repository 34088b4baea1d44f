//! Tool Capabilities
//!
//! A tool is a `{name, schema, handler}` capability the oracle session may
//! offer to the model. The registry keeps registration order so tool
//! definitions are sent in a stable order.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use assertflip_llm::{ParameterSchema, ToolDefinition};

use crate::executor::ToolResult;

/// Execution context handed to every tool call.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Instance the call is made for (logging only)
    pub instance_id: String,
    /// Checkout that relative paths are resolved against
    pub source_root: PathBuf,
}

impl ToolContext {
    pub fn new(instance_id: impl Into<String>, source_root: impl Into<PathBuf>) -> Self {
        Self {
            instance_id: instance_id.into(),
            source_root: source_root.into(),
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses to call the tool
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object
    fn parameters_schema(&self) -> ParameterSchema;

    /// Run the tool. Failures are reported in the result, never panicked.
    async fn execute(&self, ctx: &ToolContext, args: Value) -> ToolResult;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.parameters_schema(),
        }
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions in registration order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition())
            .collect()
    }

    /// Execute a tool by name. Unknown tools produce an error result.
    pub async fn execute(&self, name: &str, ctx: &ToolContext, args: Value) -> ToolResult {
        match self.tools.get(name) {
            Some(tool) => tool.execute(ctx, args).await,
            None => ToolResult::err(format!("Unknown tool: {}", name)),
        }
    }
}
