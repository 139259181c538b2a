#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use nhi_collector::{AwsIamClient, CollectorError, DirectIamApi, IdentityCollector};
use nhi_mcp_client::{McpClient, McpError, McpTransport};
use serde_json::{json, Value};

pub type Calls = Arc<Mutex<Vec<(String, Value)>>>;

type Handler = Box<dyn FnMut(&str, &Value) -> Result<Value, McpError> + Send>;

/// Transport that answers `tools/*` requests from a closure and records
/// every call as `(method or tool name, params/arguments)`.
pub struct ScriptedTransport {
    handler: Handler,
    pub calls: Calls,
    pub closed: Arc<Mutex<usize>>,
}

impl ScriptedTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: FnMut(&str, &Value) -> Result<Value, McpError> + Send + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(Mutex::new(0)),
        }
    }
}

#[async_trait]
impl McpTransport for ScriptedTransport {
    async fn ensure_started(&mut self) -> Result<(), McpError> {
        Ok(())
    }

    async fn send_request(&mut self, method: &str, params: Value) -> Result<Value, McpError> {
        let key = match method {
            "tools/call" => params["name"].as_str().unwrap_or_default().to_string(),
            other => other.to_string(),
        };
        let args = match method {
            "tools/call" => params["arguments"].clone(),
            _ => params.clone(),
        };
        self.calls.lock().unwrap().push((key.clone(), args.clone()));
        (self.handler)(&key, &args)
    }

    async fn close(&mut self) {
        *self.closed.lock().unwrap() += 1;
    }
}

/// A `tools/call` result whose single text item is `value` as JSON.
pub fn tool_result(value: Value) -> Result<Value, McpError> {
    Ok(json!({"content": [{"type": "text", "text": value.to_string()}]}))
}

pub fn tool_error(message: &str) -> Result<Value, McpError> {
    Ok(json!({"content": [{"type": "text", "text": message}], "isError": true}))
}

#[derive(Default)]
pub struct StubDirect {
    pub user: Option<Value>,
    pub keys: Vec<Value>,
    pub fail_user: bool,
    pub fail_keys: bool,
}

#[async_trait]
impl DirectIamApi for StubDirect {
    async fn get_user(&self, _user_name: &str) -> Result<Option<Value>, CollectorError> {
        if self.fail_user {
            return Err(CollectorError::Direct {
                operation: "GetUser",
                message: "AccessDenied".into(),
            });
        }
        Ok(self.user.clone())
    }

    async fn list_access_keys(&self, _user_name: &str) -> Result<Vec<Value>, CollectorError> {
        if self.fail_keys {
            return Err(CollectorError::Direct {
                operation: "ListAccessKeys",
                message: "AccessDenied".into(),
            });
        }
        Ok(self.keys.clone())
    }
}

pub fn collector(
    transport: ScriptedTransport,
    direct: StubDirect,
) -> IdentityCollector<ScriptedTransport> {
    IdentityCollector::new(AwsIamClient::new(McpClient::new(transport), Box::new(direct)))
}

/// A small IAM account: two users, one role, one group, alice has a key.
pub fn account(tool: &str, args: &Value) -> Result<Value, McpError> {
    let user = args["user_name"].as_str().unwrap_or_default();
    match tool {
        "tools/list" => Ok(json!({"tools": [
            {"name": "list_users", "inputSchema": {"required": ["ctx"]}},
            {"name": "list_roles", "inputSchema": {"required": ["ctx"]}},
            {"name": "list_groups"},
            {"name": "get_user", "inputSchema": {"required": ["ctx", "user_name"]}}
        ]})),
        "list_users" => tool_result(json!([{"Users": [
            {"UserName": "alice", "Arn": "arn:aws:iam::123:user/alice"},
            {"UserName": "bob", "Arn": "arn:aws:iam::123:user/bob"}
        ]}])),
        "list_roles" => tool_result(json!({"roles": [{"RoleName": "deployer"}]})),
        "list_groups" => tool_result(json!({"Groups": [{"GroupName": "admins"}]})),
        "get_user" if user == "alice" => tool_result(json!({"User": {
            "UserName": "alice",
            "AccessKeys": [{"AccessKeyId": "AKIAALICE", "Status": "Active", "CreateDate": "2024-01-01T00:00:00Z"}]
        }})),
        "get_user" => tool_result(json!({"User": {"UserName": user}})),
        "list_attached_user_policies" if user == "alice" => tool_result(json!({
            "AttachedPolicies": [{"PolicyName": "AdministratorAccess", "PolicyArn": "arn:aws:iam::aws:policy/AdministratorAccess"}]
        })),
        "list_attached_user_policies" => tool_result(json!({"AttachedPolicies": []})),
        "list_user_policies" => tool_result(json!({"PolicyNames": ["inline-s3"]})),
        "list_mfa_devices" if user == "bob" => tool_result(json!({"MFADevices": [{"SerialNumber": "arn:mfa/bob"}]})),
        "list_mfa_devices" => tool_result(json!({"MFADevices": []})),
        "get_login_profile" if user == "alice" => tool_result(json!({"LoginProfile": {"UserName": "alice"}})),
        "get_login_profile" => tool_error("NoSuchEntity"),
        "get_access_key_last_used" => tool_result(json!({
            "AccessKeyLastUsed": {"LastUsedDate": "2024-06-01T00:00:00Z", "ServiceName": "s3"}
        })),
        _ => tool_result(json!([])),
    }
}
