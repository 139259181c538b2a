mod common;

use common::{connect, reply, text_content, with_handshake};
use nhi_mcp_client::{normalize_collection, McpClient, McpError, TransportOptions};
use serde_json::{json, Value};

fn iam_server(method: &str, msg: &Value) -> Vec<String> {
    let params = &msg["params"];
    let result = match method {
        "tools/list" => json!({
            "tools": [
                {"name": "list_users", "description": "List IAM users",
                 "inputSchema": {"type": "object", "required": ["ctx"]}},
                {"description": "entry without a name"},
                {"name": "get_user", "inputSchema": {"required": ["ctx", "user_name"]}}
            ]
        }),
        "tools/call" => match params["name"].as_str() {
            Some("list_users") => {
                text_content(r#"[{"Users":[{"UserName":"alice"}]}]"#)
            }
            Some("get_login_profile") => json!({
                "content": [{"type": "text", "text": "NoSuchEntity: login profile not found"}],
                "isError": true
            }),
            Some("echo_args") => text_content(&params["arguments"].to_string()),
            _ => json!({"content": []}),
        },
        "resources/list" => json!({
            "resources": [{"uri": "iam://account/summary", "name": "summary", "mimeType": "application/json"}]
        }),
        "resources/read" => json!({
            "contents": [{"uri": params["uri"], "text": "{}"}]
        }),
        _ => json!({}),
    };
    vec![reply(msg, result)]
}

fn client() -> McpClient<nhi_mcp_client::StdioTransport> {
    let (t, _) = connect(with_handshake(iam_server), TransportOptions::default());
    McpClient::new(t)
}

#[tokio::test]
async fn list_tools_skips_malformed_entries() {
    let mut c = client();
    let tools = c.list_tools().await.unwrap();
    let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["list_users", "get_user"]);
    assert_eq!(tools[0].description.as_deref(), Some("List IAM users"));
    assert_eq!(tools[1].required_params(), vec!["ctx", "user_name"]);
}

#[tokio::test]
async fn end_to_end_list_users() {
    let mut c = client();
    let tools = c.list_tools().await.unwrap();
    assert!(tools.iter().any(|t| t.name == "list_users"));

    let raw = c.call_tool("list_users", None).await.unwrap();
    assert_eq!(
        normalize_collection(&raw, "Users"),
        vec![json!({"UserName": "alice"})]
    );
    c.close().await;
}

#[tokio::test]
async fn missing_arguments_are_sent_as_empty_object() {
    let mut c = client();
    assert_eq!(c.call_tool("echo_args", None).await.unwrap(), json!({}));
    assert_eq!(
        c.call_tool("echo_args", Some(json!({"user_name": "bob"}))).await.unwrap(),
        json!({"user_name": "bob"})
    );
}

#[tokio::test]
async fn is_error_result_becomes_tool_error() {
    let mut c = client();
    let err = c.call_tool("get_login_profile", None).await.unwrap_err();
    match err {
        McpError::Tool { tool, message } => {
            assert_eq!(tool, "get_login_profile");
            assert!(message.contains("NoSuchEntity"));
        }
        other => panic!("expected tool error, got {other:?}"),
    }
    // A tool error does not end the session.
    assert!(c.transport().is_ready());
}

#[tokio::test]
async fn empty_content_is_empty_list() {
    let mut c = client();
    assert_eq!(c.call_tool("unknown_tool", None).await.unwrap(), json!([]));
}

#[tokio::test]
async fn resources_round_trip() {
    let mut c = client();
    let resources = c.list_resources().await.unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].mime_type.as_deref(), Some("application/json"));

    let contents = c.read_resource(&resources[0].uri).await.unwrap();
    assert_eq!(contents, vec![json!({"uri": "iam://account/summary", "text": "{}"})]);
}
