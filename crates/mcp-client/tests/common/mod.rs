//! In-process fake MCP server over `tokio::io::duplex`.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use nhi_mcp_client::{StdioTransport, TransportOptions};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Emitted by a handler to make the server close its output.
pub const CLOSE: &str = "<close>";

pub type Received = Arc<Mutex<Vec<Value>>>;

/// Start a fake server. `handler` maps each inbound message to the lines
/// the server writes back.
pub fn connect<F>(handler: F, options: TransportOptions) -> (StdioTransport, Received)
where
    F: FnMut(&Value) -> Vec<String> + Send + 'static,
{
    let (client_io, server_io) = tokio::io::duplex(256 * 1024);
    let (client_read, client_write) = tokio::io::split(client_io);
    let (server_read, mut server_write) = tokio::io::split(server_io);

    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let log = received.clone();
    let mut handler = handler;

    tokio::spawn(async move {
        let mut lines = BufReader::new(server_read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Ok(msg) = serde_json::from_str::<Value>(&line) else {
                continue;
            };
            log.lock().unwrap().push(msg.clone());
            for out in handler(&msg) {
                if out == CLOSE {
                    let _ = server_write.shutdown().await;
                    // Keep reading so client writes don't fail.
                    while let Ok(Some(_)) = lines.next_line().await {}
                    return;
                }
                let line = format!("{out}\n");
                if server_write.write_all(line.as_bytes()).await.is_err() {
                    return;
                }
            }
        }
    });

    (
        StdioTransport::from_streams(client_read, client_write, options),
        received,
    )
}

pub fn reply(msg: &Value, result: Value) -> String {
    json!({"jsonrpc": "2.0", "id": msg["id"], "result": result}).to_string()
}

pub fn error_reply(msg: &Value, error: Value) -> String {
    json!({"jsonrpc": "2.0", "id": msg["id"], "error": error}).to_string()
}

pub fn notification(method: &str) -> String {
    json!({"jsonrpc": "2.0", "method": method, "params": {}}).to_string()
}

/// Wrap a per-method handler with a successful `initialize` reply and
/// silence for notifications.
pub fn with_handshake<F>(mut f: F) -> impl FnMut(&Value) -> Vec<String> + Send + 'static
where
    F: FnMut(&str, &Value) -> Vec<String> + Send + 'static,
{
    move |msg: &Value| {
        if msg.get("id").is_none() {
            return Vec::new();
        }
        let method = msg["method"].as_str().unwrap_or_default().to_string();
        if method == "initialize" {
            return vec![reply(
                msg,
                json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "fake-iam", "version": "0.0.0"}
                }),
            )];
        }
        f(&method, msg)
    }
}

/// `tools/call` result carrying one text item.
pub fn text_content(text: &str) -> Value {
    json!({"content": [{"type": "text", "text": text}], "isError": false})
}

pub fn methods(received: &Received) -> Vec<String> {
    received
        .lock()
        .unwrap()
        .iter()
        .map(|m| m["method"].as_str().unwrap_or_default().to_string())
        .collect()
}
