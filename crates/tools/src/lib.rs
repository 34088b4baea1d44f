//! AssertFlip Tools
//!
//! Capabilities the oracle may call during a conversation:
//!
//! - `tool` - `Tool` trait, `ToolContext`, `ToolRegistry`
//! - `executor` - `ToolResult`
//! - `symbol_info` - `get_info` symbol lookup over Python sources

pub mod executor;
pub mod symbol_info;
pub mod tool;

pub use executor::ToolResult;
pub use symbol_info::{lookup_symbol, GetInfoTool};
pub use tool::{Tool, ToolContext, ToolRegistry};

use std::sync::Arc;

/// Registry holding the default tool set.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(GetInfoTool));
    registry
}
