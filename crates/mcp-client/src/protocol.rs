//! JSON-RPC 2.0 wire types for the MCP tool-call protocol.
//!
//! Each message is a single line of JSON (newline-delimited).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

/// Protocol version sent in the `initialize` handshake. Not negotiated.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outbound
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A JSON-RPC 2.0 request (has an `id`, expects a reply).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

impl<'a> JsonRpcRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// A JSON-RPC 2.0 notification (no `id`, fire-and-forget).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JsonRpcNotification<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    pub params: Value,
}

impl<'a> JsonRpcNotification<'a> {
    pub fn new(method: &'a str) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params: json!({}),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inbound
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Any message read from the server.
///
/// `id` is absent on notifications; a present `null` id is kept as
/// `Some(Value::Null)` (servers answer unparseable requests that way).
/// `error` is kept as raw JSON: servers do not agree on its shape and
/// callers only surface it.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct IncomingMessage {
    #[serde(default, deserialize_with = "present")]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl IncomingMessage {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// The error field, if present and non-null.
    pub fn error(&self) -> Option<&Value> {
        self.error.as_ref().filter(|e| !e.is_null())
    }

    /// The result, or an empty object when the reply carried none.
    pub fn into_result(self) -> Value {
        match self.result {
            Some(Value::Null) | None => json!({}),
            Some(v) => v,
        }
    }
}

fn present<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(de).map(Some)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MCP payloads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Client identity sent during `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "nhi-agent".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// Parameters for the `initialize` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams<'a> {
    pub protocol_version: &'static str,
    pub capabilities: Value,
    pub client_info: &'a ClientInfo,
}

pub fn initialize_params(client: &ClientInfo) -> InitializeParams<'_> {
    InitializeParams {
        protocol_version: PROTOCOL_VERSION,
        capabilities: json!({}),
        client_info: client,
    }
}

/// A tool declared by the server in `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Option<Value>,
}

impl ToolDescriptor {
    /// Parameter names listed under `inputSchema.required`.
    pub fn required_params(&self) -> Vec<&str> {
        self.input_schema
            .as_ref()
            .and_then(|s| s.get("required"))
            .and_then(Value::as_array)
            .map(|req| req.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// True when every required parameter is in `allowed`.
    pub fn callable_with(&self, allowed: &[&str]) -> bool {
        self.required_params().iter().all(|p| allowed.contains(p))
    }
}

/// A resource declared by the server in `resources/list`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub uri: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_line_shape() {
        let req = JsonRpcRequest::new(3, "tools/list", json!({}));
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(
            v,
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/list", "params": {}})
        );
    }

    #[test]
    fn initialized_notification_has_no_id_and_empty_params() {
        let v = serde_json::to_value(JsonRpcNotification::new("notifications/initialized")).unwrap();
        assert!(v.get("id").is_none());
        assert_eq!(v["params"], json!({}));
    }

    #[test]
    fn initialize_params_carry_fixed_version_and_client() {
        let client = ClientInfo {
            name: "nhi-agent".into(),
            version: "9.9.9".into(),
        };
        let v = serde_json::to_value(initialize_params(&client)).unwrap();
        assert_eq!(v["protocolVersion"], "2024-11-05");
        assert_eq!(v["capabilities"], json!({}));
        assert_eq!(v["clientInfo"], json!({"name": "nhi-agent", "version": "9.9.9"}));
    }

    #[test]
    fn message_without_id_is_notification() {
        let msg: IncomingMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/progress","params":{}}"#)
                .unwrap();
        assert!(msg.is_notification());

    }

    #[test]
    fn null_id_is_a_reply_not_a_notification() {
        let msg: IncomingMessage = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"Parse error"}}"#,
        )
        .unwrap();
        assert!(!msg.is_notification());
        assert_eq!(msg.id, Some(Value::Null));
        assert_eq!(msg.error().unwrap()["code"], -32700);
    }

    #[test]
    fn missing_result_becomes_empty_object() {
        let msg: IncomingMessage = serde_json::from_str(r#"{"jsonrpc":"2.0","id":1}"#).unwrap();
        assert!(msg.error().is_none());
        assert_eq!(msg.into_result(), json!({}));
    }

    #[test]
    fn null_error_is_not_an_error() {
        let msg: IncomingMessage =
            serde_json::from_str(r#"{"id":1,"result":[1],"error":null}"#).unwrap();
        assert!(msg.error().is_none());
    }

    #[test]
    fn descriptor_required_params() {
        let tool: ToolDescriptor = serde_json::from_value(json!({
            "name": "list_users",
            "inputSchema": {"type": "object", "required": ["ctx"]}
        }))
        .unwrap();
        assert_eq!(tool.required_params(), vec!["ctx"]);
        assert!(tool.callable_with(&["ctx"]));
        assert!(!tool.callable_with(&[]));

        let bare: ToolDescriptor = serde_json::from_value(json!({"name": "ping"})).unwrap();
        assert!(bare.description.is_none());
        assert!(bare.callable_with(&[]));
    }
}
