//! Built-in tool implementations for AgentCanvas.
//!
//! Tools give an agent capabilities beyond producing text. Each one runs
//! with the [`ToolContext`](agentcanvas_core::tool::ToolContext) of the
//! current run, so memory lookups stay scoped to the run's subject.

pub mod current_time;
pub mod memory_search;

use agentcanvas_core::tool::ToolRegistry;

pub use current_time::CurrentTimeTool;
pub use memory_search::MemorySearchTool;

/// A registry holding every built-in tool.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(MemorySearchTool));
    registry.register(Box::new(CurrentTimeTool));
    registry
}
