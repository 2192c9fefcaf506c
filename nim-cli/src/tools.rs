//! Built-in tools available to `nim agent` and `nim chat`.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use serde_json::{json, Value};

use nim_core::tool::{Tool, ToolBox};
use nim_core::types::ToolDefinition;

/// Current date and time, optionally at a fixed UTC offset.
pub struct CurrentTimeTool {
    definition: ToolDefinition,
}

impl CurrentTimeTool {
    pub fn new() -> Self {
        Self {
            definition: ToolDefinition {
                name: "current_time".into(),
                description: "Returns the current date and time in RFC 3339 format.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "utc_offset_hours": {
                            "type": "integer",
                            "description": "Hours east of UTC, e.g. -5 or 9. Defaults to 0."
                        }
                    }
                }),
            },
        }
    }
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn invoke(&self, input: Value) -> Result<Value> {
        let hours = input
            .get("utc_offset_hours")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let offset = i32::try_from(hours * 3600)
            .ok()
            .and_then(FixedOffset::east_opt)
            .with_context(|| format!("utc_offset_hours out of range: {}", hours))?;
        let now = Utc::now().with_timezone(&offset);
        Ok(json!({ "now": now.to_rfc3339() }))
    }
}

pub fn builtin_tools() -> ToolBox {
    ToolBox::new().with(Arc::new(CurrentTimeTool::new()))
}
