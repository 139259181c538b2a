//! Tool invoker: `tools/*` and `resources/*` on top of a transport.
//!
//! Errors are never swallowed here; degrading to defaults is the caller's
//! decision.

use serde_json::{json, Value};

use nhi_domain::config::{AwsConfig, McpConfig};

use crate::error::McpError;
use crate::protocol::{ResourceDescriptor, ToolDescriptor};
use crate::transport::{McpTransport, ServerCommand, StdioTransport, TransportOptions};

pub struct McpClient<T = StdioTransport> {
    transport: T,
}

impl McpClient<StdioTransport> {
    /// A client whose server process is spawned on the first call.
    pub fn from_config(mcp: &McpConfig, aws: &AwsConfig) -> Self {
        Self::new(StdioTransport::spawn_lazy(
            ServerCommand::from_config(mcp, aws),
            TransportOptions::from_config(mcp),
        ))
    }
}

impl<T: McpTransport> McpClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn ensure_started(&mut self) -> Result<(), McpError> {
        self.transport.ensure_started().await
    }

    /// Declared tools. Entries that do not parse as descriptors are skipped.
    pub async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>, McpError> {
        let result = self.transport.send_request("tools/list", json!({})).await?;
        let tools = match result.get("tools").and_then(Value::as_array) {
            Some(list) => list,
            None => return Ok(Vec::new()),
        };

        Ok(tools
            .iter()
            .filter_map(|entry| match serde_json::from_value(entry.clone()) {
                Ok(tool) => Some(tool),
                Err(e) => {
                    tracing::debug!(error = %e, entry = %entry, "skipping malformed tool entry");
                    None
                }
            })
            .collect())
    }

    /// Call a tool and unwrap its content envelope.
    ///
    /// A first content item with `text` is parsed as JSON, or returned as a
    /// plain string when it is not JSON. Other non-empty content is returned
    /// as the raw list; missing content yields `[]`.
    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: Option<Value>,
    ) -> Result<Value, McpError> {
        let params = json!({
            "name": name,
            "arguments": arguments.unwrap_or_else(|| json!({})),
        });
        let result = self.transport.send_request("tools/call", params).await?;

        if result.get("isError").and_then(Value::as_bool) == Some(true) {
            let message = first_text(&result)
                .unwrap_or("tool reported an error")
                .to_string();
            tracing::debug!(tool = name, error = %message, "tool call flagged isError");
            return Err(McpError::Tool {
                tool: name.to_string(),
                message,
            });
        }

        Ok(unwrap_content(result))
    }

    pub async fn list_resources(&mut self) -> Result<Vec<ResourceDescriptor>, McpError> {
        let result = self.transport.send_request("resources/list", json!({})).await?;
        let resources = result
            .get("resources")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|r| serde_json::from_value(r.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();
        Ok(resources)
    }

    pub async fn read_resource(&mut self, uri: &str) -> Result<Vec<Value>, McpError> {
        let mut result = self
            .transport
            .send_request("resources/read", json!({ "uri": uri }))
            .await?;
        match result.get_mut("contents").map(Value::take) {
            Some(Value::Array(contents)) => Ok(contents),
            _ => Ok(Vec::new()),
        }
    }

    pub async fn close(&mut self) {
        self.transport.close().await;
    }
}

fn first_text(result: &Value) -> Option<&str> {
    result
        .get("content")?
        .as_array()?
        .first()?
        .get("text")?
        .as_str()
}

fn unwrap_content(mut result: Value) -> Value {
    let content = match result.get_mut("content").map(Value::take) {
        Some(Value::Array(items)) if !items.is_empty() => items,
        _ => return Value::Array(Vec::new()),
    };

    match content[0].get("text").and_then(Value::as_str) {
        Some(text) => serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())),
        None => Value::Array(content),
    }
}
