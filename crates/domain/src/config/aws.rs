use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AWS credentials and region
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default = "d_region")]
    pub region: String,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            profile: None,
            region: d_region(),
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

impl AwsConfig {
    /// The key pair, only when both halves are present and non-empty.
    pub fn static_credentials(&self) -> Option<(&str, &str)> {
        match (self.access_key_id.as_deref(), self.secret_access_key.as_deref()) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Some((id, secret)),
            _ => None,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.static_credentials().is_some() || self.profile.is_some()
    }

    /// Copy of this config that authenticates as a specific user with the
    /// given key pair. Profile selection is dropped.
    pub fn with_user_credentials(&self, access_key_id: String, secret_access_key: String) -> Self {
        Self {
            profile: None,
            region: self.region.clone(),
            access_key_id: Some(access_key_id),
            secret_access_key: Some(secret_access_key),
        }
    }
}

impl fmt::Debug for AwsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsConfig")
            .field("profile", &self.profile)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id.as_deref().map(mask))
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "***"),
            )
            .finish()
    }
}

fn mask(id: &str) -> String {
    let tail: String = id.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("***{tail}")
}

/// Env var names holding per-user credentials for secure mode:
/// `AWS_USER_{name}_KEY` / `AWS_USER_{name}_SECRET`.
pub fn user_credential_env_keys(user_name: &str) -> (String, String) {
    (
        format!("AWS_USER_{user_name}_KEY"),
        format!("AWS_USER_{user_name}_SECRET"),
    )
}

fn d_region() -> String {
    "us-east-1".into()
}
