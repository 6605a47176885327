//! Current UTC time.

use async_trait::async_trait;
use chrono::Utc;
use ponder_core::error::ToolError;
use ponder_core::tool::{ParamSpec, ParamType, Tool, ToolContext, ToolDescriptor};
use serde_json::{Value, json};

pub struct CurrentTimeTool {
    descriptor: ToolDescriptor,
}

impl CurrentTimeTool {
    pub fn new() -> Self {
        let descriptor = ToolDescriptor::new(
            "current_time",
            "Get the current date and time in UTC. Optionally pass a strftime `format`.",
        )
        .category("utility")
        .timeout_ms(1_000)
        .param(ParamSpec::optional(
            "format",
            ParamType::String,
            "strftime format string, e.g. '%Y-%m-%d'; defaults to RFC 3339",
        ));
        Self { descriptor }
    }
}

impl Default for CurrentTimeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        let now = Utc::now();
        let formatted = match params["format"].as_str() {
            Some(fmt) => {
                use std::fmt::Write;
                // chrono reports a bad specifier as a fmt::Error on write
                let mut out = String::new();
                write!(out, "{}", now.format(fmt)).map_err(|_| {
                    ToolError::execution(&self.descriptor.name, format!("invalid format '{fmt}'"))
                })?;
                out
            }
            None => now.to_rfc3339(),
        };
        Ok(json!({
            "utc": formatted,
            "unix": now.timestamp(),
        }))
    }
}
