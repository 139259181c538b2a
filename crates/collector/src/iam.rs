//! IAM queries issued as tool calls against the IAM MCP server.
//!
//! Listing calls never fail: each tries an ordered chain of candidate tool
//! names and degrades to an empty list. Per-user lookups return `Result` so
//! the caller can degrade one field at a time.

use base64::Engine as _;
use serde_json::{json, Map, Value};

use nhi_domain::config::{AwsConfig, McpConfig};
use nhi_domain::identity::{user_name_of, IdentityInventory};
use nhi_mcp_client::normalize::{is_falsy, unwrap_list, unwrap_object};
use nhi_mcp_client::{
    normalize_collection, McpClient, McpTransport, StdioTransport, ToolDescriptor,
};

use crate::direct::{DirectIamApi, SdkIamApi};
use crate::error::CollectorError;

/// Parameters a discovered listing tool may require.
const AUTO_FILLED_PARAMS: [&str; 1] = ["ctx"];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entity kinds
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Role,
    Group,
}

impl EntityKind {
    /// Substring a matching tool name must contain.
    fn needle(self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Role => "role",
            EntityKind::Group => "group",
        }
    }

    fn fallbacks(self) -> [&'static str; 3] {
        match self {
            EntityKind::User => ["list_users", "iam_list_users", "aws_list_users"],
            EntityKind::Role => ["list_roles", "iam_list_roles", "aws_list_roles"],
            EntityKind::Group => ["list_groups", "iam_list_groups", "aws_list_groups"],
        }
    }

    /// Key the records are wrapped under in a result envelope.
    fn result_key(self) -> &'static str {
        match self {
            EntityKind::User => "Users",
            EntityKind::Role => "Roles",
            EntityKind::Group => "Groups",
        }
    }

    /// Whether a declared tool looks like a no-argument listing for this kind.
    pub fn matches(self, tool: &ToolDescriptor) -> bool {
        let name = tool.name.to_lowercase();
        name.contains(self.needle())
            && (name.contains("list") || name.contains("get"))
            && tool.callable_with(&AUTO_FILLED_PARAMS)
    }
}

/// Tool arguments: the minimal `ctx` object plus `extra`.
pub fn tool_args<const N: usize>(extra: [(&str, Value); N]) -> Value {
    let mut args = Map::new();
    args.insert("ctx".into(), json!({"content": [], "isError": false}));
    for (k, v) in extra {
        args.insert(k.to_string(), v);
    }
    Value::Object(args)
}

/// Access-key records inside a `get_user` result, wherever the server put
/// them.
pub fn extract_access_keys(details: &Value) -> Vec<Value> {
    let nested = details.get("User");
    [
        details.get("access_keys"),
        details.get("AccessKeys"),
        nested.and_then(|u| u.get("access_keys")),
        nested.and_then(|u| u.get("AccessKeys")),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_array)
    .find(|keys| !keys.is_empty())
    .cloned()
    .unwrap_or_default()
}

/// A decoded IAM credential report.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialReport {
    /// CSV text, or the undecoded content when it was not valid base64.
    pub content: String,
    pub raw: Value,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AwsIamClient<T = StdioTransport> {
    mcp: McpClient<T>,
    direct: Box<dyn DirectIamApi>,
    tools: Option<Vec<ToolDescriptor>>,
}

impl AwsIamClient<StdioTransport> {
    /// Client for the configured IAM tool server. Nothing is spawned until
    /// the first query.
    pub fn from_config(mcp: &McpConfig, aws: &AwsConfig) -> Self {
        Self::new(
            McpClient::from_config(mcp, aws),
            Box::new(SdkIamApi::new(aws.clone())),
        )
    }
}

impl<T: McpTransport> AwsIamClient<T> {
    pub fn new(mcp: McpClient<T>, direct: Box<dyn DirectIamApi>) -> Self {
        Self {
            mcp,
            direct,
            tools: None,
        }
    }

    pub async fn close(&mut self) {
        self.mcp.close().await;
    }

    async fn call(&mut self, tool: &str, args: Value) -> Result<Value, CollectorError> {
        Ok(self.mcp.call_tool(tool, Some(args)).await?)
    }

    // ── discovery ───────────────────────────────────────────────────

    /// Declared tools, fetched once per session. A failed `tools/list` is
    /// remembered as an empty declaration.
    async fn declared_tools(&mut self) -> &[ToolDescriptor] {
        if self.tools.is_none() {
            let tools = match self.mcp.list_tools().await {
                Ok(tools) => tools,
                Err(e) => {
                    tracing::warn!(error = %e, "tools/list failed, using fallback tool names");
                    Vec::new()
                }
            };
            self.tools = Some(tools);
        }
        self.tools.as_deref().unwrap_or_default()
    }

    async fn candidates(&mut self, kind: EntityKind) -> Vec<String> {
        let discovered: Vec<String> = self
            .declared_tools()
            .await
            .iter()
            .filter(|t| kind.matches(t))
            .map(|t| t.name.clone())
            .collect();

        if discovered.is_empty() {
            kind.fallbacks().iter().map(|s| s.to_string()).collect()
        } else {
            discovered
        }
    }

    /// Try each candidate with `ctx`, then with no arguments. First
    /// non-empty result wins.
    async fn list_entities(&mut self, kind: EntityKind) -> Vec<Value> {
        for tool in self.candidates(kind).await {
            for args in [Some(tool_args([])), None] {
                match self.mcp.call_tool(&tool, args).await {
                    Ok(raw) if !is_falsy(&raw) => {
                        let records = normalize_collection(&raw, kind.result_key());
                        if !records.is_empty() {
                            tracing::debug!(tool = %tool, count = records.len(), "listed IAM entities");
                            return records;
                        }
                    }
                    Ok(_) => {}
                    Err(e) if e.is_fatal() => {
                        tracing::warn!(tool = %tool, error = %e, "MCP session failed while listing");
                        return Vec::new();
                    }
                    Err(e) => {
                        tracing::debug!(tool = %tool, error = %e, "candidate tool failed");
                    }
                }
            }
        }
        tracing::warn!(kind = ?kind, "no listing tool returned results");
        Vec::new()
    }

    pub async fn list_users(&mut self) -> Vec<Value> {
        self.list_entities(EntityKind::User).await
    }

    pub async fn list_roles(&mut self) -> Vec<Value> {
        self.list_entities(EntityKind::Role).await
    }

    pub async fn list_groups(&mut self) -> Vec<Value> {
        self.list_entities(EntityKind::Group).await
    }

    // ── inventory ───────────────────────────────────────────────────

    /// Raw `get_user` result, or `{}` on failure or empty result.
    pub async fn get_user_details(&mut self, user_name: &str) -> Value {
        match self
            .call("get_user", tool_args([("user_name", json!(user_name))]))
            .await
        {
            Ok(v) if !is_falsy(&v) => v,
            Ok(_) => json!({}),
            Err(e) => {
                tracing::warn!(user_name, error = %e, "get_user failed");
                json!({})
            }
        }
    }

    /// Access keys of every listed user, tagged with the owner's name.
    pub async fn list_all_access_keys(&mut self) -> Vec<Value> {
        let users = self.list_users().await;
        self.access_keys_for(&users).await
    }

    async fn access_keys_for(&mut self, users: &[Value]) -> Vec<Value> {
        let mut all = Vec::new();
        for user in users {
            let Some(name) = user_name_of(user) else {
                continue;
            };
            let details = self.get_user_details(name).await;
            for mut key in extract_access_keys(&details) {
                if let Some(obj) = key.as_object_mut() {
                    obj.insert("UserName".into(), json!(name));
                    all.push(key);
                }
            }
        }
        all
    }

    /// Users, roles, groups and access keys, each collected independently.
    pub async fn get_identity_details(&mut self) -> IdentityInventory {
        let users = self.list_users().await;
        let roles = self.list_roles().await;
        let groups = self.list_groups().await;
        let access_keys = self.access_keys_for(&users).await;
        IdentityInventory {
            users,
            roles,
            groups,
            access_keys,
        }
    }

    /// Least-privilege collection for one user via the SDK only. Roles and
    /// groups are always empty.
    pub async fn get_single_user_identity_details(&mut self, user_name: &str) -> IdentityInventory {
        let mut inventory = IdentityInventory::default();

        match self.direct.get_user(user_name).await {
            Ok(Some(user)) => inventory.users.push(user),
            Ok(None) => tracing::warn!(user_name, "GetUser returned no user"),
            Err(e) => tracing::warn!(user_name, error = %e, "direct GetUser failed"),
        }

        match self.direct.list_access_keys(user_name).await {
            Ok(keys) => {
                for mut key in keys {
                    let Some(obj) = key.as_object_mut() else {
                        continue;
                    };
                    obj.insert("UserName".into(), json!(user_name));
                    obj.insert("user_name".into(), json!(user_name));
                    if let Some(created) = obj.get("CreateDate").cloned() {
                        obj.insert("create_date".into(), created);
                    }
                    inventory.access_keys.push(key);
                }
            }
            Err(e) => tracing::warn!(user_name, error = %e, "direct ListAccessKeys failed"),
        }

        inventory
    }

    // ── expanded-permission queries ─────────────────────────────────

    pub async fn list_attached_user_policies(
        &mut self,
        user_name: &str,
    ) -> Result<Vec<Value>, CollectorError> {
        let raw = self
            .call("list_attached_user_policies", tool_args([("user_name", json!(user_name))]))
            .await?;
        Ok(unwrap_list(&raw, &["AttachedPolicies", "attached_policies"]))
    }

    /// Inline policy names.
    pub async fn list_user_policies(&mut self, user_name: &str) -> Result<Vec<String>, CollectorError> {
        let raw = self
            .call("list_user_policies", tool_args([("user_name", json!(user_name))]))
            .await?;
        Ok(unwrap_list(&raw, &["PolicyNames", "policy_names"])
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect())
    }

    pub async fn get_user_policy(
        &mut self,
        user_name: &str,
        policy_name: &str,
    ) -> Result<Map<String, Value>, CollectorError> {
        let raw = self
            .call(
                "get_user_policy",
                tool_args([("user_name", json!(user_name)), ("policy_name", json!(policy_name))]),
            )
            .await?;
        Ok(raw.as_object().cloned().unwrap_or_default())
    }

    pub async fn get_policy(&mut self, policy_arn: &str) -> Result<Map<String, Value>, CollectorError> {
        let raw = self
            .call("get_policy", tool_args([("policy_arn", json!(policy_arn))]))
            .await?;
        Ok(unwrap_object(&raw, &["Policy"]))
    }

    pub async fn get_policy_version(
        &mut self,
        policy_arn: &str,
        version_id: &str,
    ) -> Result<Map<String, Value>, CollectorError> {
        let raw = self
            .call(
                "get_policy_version",
                tool_args([("policy_arn", json!(policy_arn)), ("version_id", json!(version_id))]),
            )
            .await?;
        Ok(unwrap_object(&raw, &["PolicyVersion"]))
    }

    pub async fn list_mfa_devices(&mut self, user_name: &str) -> Result<Vec<Value>, CollectorError> {
        let raw = self
            .call("list_mfa_devices", tool_args([("user_name", json!(user_name))]))
            .await?;
        Ok(unwrap_list(&raw, &["MFADevices", "mfa_devices"]))
    }

    /// Console login profile. Users without console access make the server
    /// report an error; that is expected.
    pub async fn get_login_profile(
        &mut self,
        user_name: &str,
    ) -> Result<Map<String, Value>, CollectorError> {
        let raw = self
            .call("get_login_profile", tool_args([("user_name", json!(user_name))]))
            .await?;
        Ok(unwrap_object(&raw, &["LoginProfile"]))
    }

    pub async fn get_access_key_last_used(
        &mut self,
        access_key_id: &str,
    ) -> Result<Map<String, Value>, CollectorError> {
        let raw = self
            .call(
                "get_access_key_last_used",
                tool_args([("access_key_id", json!(access_key_id))]),
            )
            .await?;
        Ok(unwrap_object(&raw, &["AccessKeyLastUsed", "access_key_last_used"]))
    }

    /// Start report generation. True when the server reports it as started,
    /// in progress or complete.
    pub async fn generate_credential_report(&mut self) -> Result<bool, CollectorError> {
        let raw = self.call("generate_credential_report", tool_args([])).await?;
        let state = raw
            .get("State")
            .or_else(|| raw.get("state"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(matches!(state, "STARTED" | "INPROGRESS" | "COMPLETE"))
    }

    /// The credential report, if one is available.
    pub async fn get_credential_report(&mut self) -> Result<Option<CredentialReport>, CollectorError> {
        let raw = self.call("get_credential_report", tool_args([])).await?;
        let content = raw
            .get("Content")
            .or_else(|| raw.get("content"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if content.is_empty() {
            return Ok(None);
        }

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(content)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok());
        let content = decoded.unwrap_or_else(|| content.to_string());
        Ok(Some(CredentialReport { content, raw }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str, required: &[&str]) -> ToolDescriptor {
        serde_json::from_value(json!({"name": name, "inputSchema": {"required": required}})).unwrap()
    }

    #[test]
    fn discovery_filter() {
        assert!(EntityKind::User.matches(&tool("list_users", &["ctx"])));
        assert!(EntityKind::User.matches(&tool("IAM_Get_Users", &[])));
        assert!(!EntityKind::User.matches(&tool("get_user", &["ctx", "user_name"])));
        assert!(!EntityKind::User.matches(&tool("delete_user", &[])));
        assert!(EntityKind::Role.matches(&tool("list_roles", &[])));
        assert!(!EntityKind::Role.matches(&tool("list_users", &[])));
        assert!(EntityKind::Group.matches(&tool("list_groups", &["ctx"])));
    }

    #[test]
    fn tool_args_always_carry_ctx() {
        assert_eq!(tool_args([]), json!({"ctx": {"content": [], "isError": false}}));
        assert_eq!(
            tool_args([("user_name", json!("alice"))])["user_name"],
            json!("alice")
        );
    }

    #[test]
    fn access_keys_found_in_any_location() {
        let k = json!({"AccessKeyId": "AKIA1"});
        for details in [
            json!({"access_keys": [k.clone()]}),
            json!({"AccessKeys": [k.clone()]}),
            json!({"User": {"access_keys": [k.clone()]}}),
            json!({"access_keys": [], "User": {"AccessKeys": [k.clone()]}}),
        ] {
            assert_eq!(extract_access_keys(&details), vec![k.clone()], "{details}");
        }
        assert!(extract_access_keys(&json!({})).is_empty());
        assert!(extract_access_keys(&json!("text")).is_empty());
    }
}
