//! Current time tool.

use async_trait::async_trait;
use agentcanvas_core::error::ToolError;
use agentcanvas_core::tool::{Tool, ToolContext, ToolResult};
use chrono::{SecondsFormat, Utc};

pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time in UTC (RFC 3339)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _arguments: serde_json::Value, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let now = Utc::now();
        Ok(ToolResult::ok(now.to_rfc3339_opts(SecondsFormat::Secs, true)).with_data(
            serde_json::json!({
                "unix": now.timestamp(),
                "weekday": now.format("%A").to_string(),
            }),
        ))
    }
}
