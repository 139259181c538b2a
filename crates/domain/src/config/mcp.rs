//! `[mcp]` section: how the IAM tool server is launched and identified.
//!
//! The actual protocol client lives in the `nhi-mcp-client` crate; this is
//! only the deserialized shape plus the environment overlay handed to the
//! child process.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::AwsConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    /// The command to spawn (e.g. `"uvx"`).
    #[serde(default = "d_command")]
    pub command: String,

    /// Arguments to pass to the command.
    #[serde(default = "d_args")]
    pub args: Vec<String>,

    /// Value exported as `FASTMCP_LOG_LEVEL` to the child.
    #[serde(default = "d_log_level")]
    pub log_level: String,

    /// `clientInfo.name` sent in the `initialize` handshake.
    #[serde(default = "d_client_name")]
    pub client_name: String,

    /// `clientInfo.version` sent in the `initialize` handshake.
    #[serde(default = "d_client_version")]
    pub client_version: String,

    /// Optional read deadline per request. Unset means wait indefinitely.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,

    /// Extra environment variables for the spawned process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            command: d_command(),
            args: d_args(),
            log_level: d_log_level(),
            client_name: d_client_name(),
            client_version: d_client_version(),
            request_timeout_ms: None,
            env: BTreeMap::new(),
        }
    }
}

impl McpConfig {
    /// Environment overlay for the child process.
    ///
    /// Explicit credentials win over a profile; when a complete key pair is
    /// present `AWS_PROFILE` is not exported at all. Entries from `env` are
    /// applied last.
    pub fn process_env(&self, aws: &AwsConfig) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        out.insert("FASTMCP_LOG_LEVEL".to_string(), self.log_level.clone());

        match aws.static_credentials() {
            Some((key_id, secret)) => {
                out.insert("AWS_ACCESS_KEY_ID".to_string(), key_id.to_string());
                out.insert("AWS_SECRET_ACCESS_KEY".to_string(), secret.to_string());
            }
            None => {
                if let Some(profile) = &aws.profile {
                    out.insert("AWS_PROFILE".to_string(), profile.clone());
                }
            }
        }
        out.insert("AWS_REGION".to_string(), aws.region.clone());

        for (k, v) in &self.env {
            out.insert(k.clone(), v.clone());
        }
        out
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_command() -> String {
    "uvx".into()
}
fn d_args() -> Vec<String> {
    vec!["awslabs.iam-mcp-server@latest".into()]
}
fn d_log_level() -> String {
    "ERROR".into()
}
fn d_client_name() -> String {
    "nhi-agent".into()
}
fn d_client_version() -> String {
    env!("CARGO_PKG_VERSION").into()
}
