//! Tool trait: capabilities an agent can invoke during a run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use crate::error::ToolError;
use crate::memory::MemoryHandle;
use crate::provider::ToolDefinition;

/// A request to execute a tool, as emitted by an agent turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// What a tool may know about the run invoking it.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub conversation_id: Uuid,
    pub agent_id: Option<Uuid>,
    /// The run's memory session, bound to the conversation's subject
    pub memory: MemoryHandle,
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "memory_search").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// The Turn Executor advertises definitions from here; the Tool Runner
/// looks tools up by name when executing pending calls.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Definitions of every registered tool, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Definitions restricted to an agent's allowlist. `None` means all tools.
    pub fn definitions_for(&self, allowed: Option<&[String]>) -> Vec<ToolDefinition> {
        match allowed {
            None => self.definitions(),
            Some(names) => self
                .definitions()
                .into_iter()
                .filter(|d| names.iter().any(|n| n == &d.name))
                .collect(),
        }
    }

    /// Execute a tool call.
    pub async fn execute(
        &self,
        call: &ToolCall,
        ctx: &ToolContext,
    ) -> std::result::Result<ToolResult, ToolError> {
        let tool = self.tools.get(&call.name).ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        tool.execute(call.arguments.clone(), ctx).await
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: serde_json::Value, _ctx: &ToolContext) -> std::result::Result<ToolResult, ToolError> {
            let text = arguments["text"]
                .as_str()
                .ok_or_else(|| ToolError::InvalidArguments("missing 'text'".into()))?;
            Ok(ToolResult::ok(text))
        }
    }

    struct UpperTool;

    #[async_trait]
    impl Tool for UpperTool {
        fn name(&self) -> &str { "upper" }
        fn description(&self) -> &str { "Upper-cases the input" }
        fn parameters_schema(&self) -> serde_json::Value { serde_json::json!({"type": "object"}) }
        async fn execute(&self, arguments: serde_json::Value, ctx: &ToolContext) -> std::result::Result<ToolResult, ToolError> {
            assert_eq!(ctx.memory.backend(), "none");
            Ok(ToolResult::ok(arguments["text"].as_str().unwrap_or("").to_uppercase()))
        }
    }

    struct NoMemory;

    #[async_trait]
    impl crate::memory::MemoryStore for NoMemory {
        fn name(&self) -> &str { "none" }
        async fn add(
            &self,
            _text: &str,
            _subject: &crate::memory::MemorySubject,
            _metadata: serde_json::Map<String, serde_json::Value>,
        ) -> std::result::Result<String, crate::error::MemoryError> {
            Ok(String::new())
        }
        async fn search(
            &self,
            _query: &str,
            _subject: &crate::memory::MemorySubject,
            _limit: usize,
        ) -> std::result::Result<Vec<crate::memory::MemoryHit>, crate::error::MemoryError> {
            Ok(vec![])
        }
    }

    fn ctx() -> ToolContext {
        let conversation_id = Uuid::new_v4();
        ToolContext {
            conversation_id,
            agent_id: None,
            memory: MemoryHandle::new(
                std::sync::Arc::new(NoMemory),
                crate::memory::MemorySubject::conversation(conversation_id),
            ),
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(UpperTool));
        registry.register(Box::new(EchoTool));
        registry
    }

    #[test]
    fn definitions_are_sorted() {
        let defs = registry().definitions();
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["echo", "upper"]);
    }

    #[test]
    fn allowlist_filters_definitions() {
        let allowed = vec!["upper".to_string()];
        let defs = registry().definitions_for(Some(&allowed));
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "upper");
        assert_eq!(registry().definitions_for(None).len(), 2);
    }

    #[tokio::test]
    async fn registry_execute_tool() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "echo".into(),
            arguments: serde_json::json!({"text": "hello world"}),
        };
        let result = registry().execute(&call, &ctx()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "hello world");
    }

    #[tokio::test]
    async fn registry_execute_missing_tool() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "nonexistent".into(),
            arguments: serde_json::json!({}),
        };
        let err = registry().execute(&call, &ctx()).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn invalid_arguments_surface_as_error() {
        let call = ToolCall {
            id: "call_2".into(),
            name: "echo".into(),
            arguments: serde_json::json!({}),
        };
        let err = registry().execute(&call, &ctx()).await.unwrap_err();
        assert!(err.to_string().contains("missing 'text'"));
    }
}
