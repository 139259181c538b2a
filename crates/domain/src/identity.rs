//! Identity inventory types shared by the collector, the analyzer and the
//! HTTP surface.
//!
//! Provider records stay opaque JSON objects: the IAM tool server and the
//! SDK path disagree on field casing (`UserName` vs `user_name`), and the
//! analyzer reads both.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field names that identify the owning user of a record, in lookup order.
pub const USER_NAME_KEYS: [&str; 3] = ["UserName", "user_name", "name"];

/// Name of the user a record belongs to (or is), if any.
pub fn user_name_of(record: &Value) -> Option<&str> {
    USER_NAME_KEYS
        .iter()
        .find_map(|k| record.get(*k).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

/// Access-key id under either casing.
pub fn access_key_id_of(record: &Value) -> Option<&str> {
    ["AccessKeyId", "access_key_id"]
        .iter()
        .find_map(|k| record.get(*k).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inventory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityInventory {
    #[serde(default)]
    pub users: Vec<Value>,
    #[serde(default)]
    pub roles: Vec<Value>,
    #[serde(default)]
    pub groups: Vec<Value>,
    #[serde(default)]
    pub access_keys: Vec<Value>,
}

impl IdentityInventory {
    pub fn total_count(&self) -> usize {
        self.users.len() + self.roles.len() + self.groups.len() + self.access_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_count() == 0
    }

    /// The user record owning `key`, matched by name.
    pub fn owner_of(&self, key: &Value) -> Option<&Value> {
        let owner = user_name_of(key)?;
        self.users
            .iter()
            .find(|u| user_name_of(u) == Some(owner))
    }
}

/// Result of one collection run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionReport {
    pub aws: IdentityInventory,
    pub total_count: usize,
}

impl CollectionReport {
    pub fn new(aws: IdentityInventory) -> Self {
        let total_count = aws.total_count();
        Self { aws, total_count }
    }
}

impl From<IdentityInventory> for CollectionReport {
    fn from(aws: IdentityInventory) -> Self {
        Self::new(aws)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Enrichment
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A user record plus permission, MFA, console and key-usage metadata.
///
/// Every augmentation defaults to empty/false so a user whose sub-fetch
/// failed is still representable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedUser {
    #[serde(flatten)]
    pub user: Map<String, Value>,
    #[serde(default)]
    pub attached_policies: Vec<Value>,
    #[serde(default)]
    pub inline_policies: Vec<String>,
    #[serde(default)]
    pub mfa_devices: Vec<Value>,
    #[serde(default)]
    pub has_mfa: bool,
    #[serde(default)]
    pub has_console_access: bool,
    #[serde(default)]
    pub login_profile: Map<String, Value>,
    /// Access-key records, each carrying a `last_used` object.
    #[serde(default)]
    pub access_keys_enriched: Vec<Value>,
}

impl EnrichedUser {
    pub fn from_user(user: Map<String, Value>) -> Self {
        Self {
            user,
            ..Self::default()
        }
    }

    pub fn user_name(&self) -> Option<&str> {
        USER_NAME_KEYS
            .iter()
            .find_map(|k| self.user.get(*k).and_then(Value::as_str))
            .filter(|s| !s.is_empty())
    }

    /// Names of attached managed policies.
    pub fn attached_policy_names(&self) -> impl Iterator<Item = &str> {
        self.attached_policies.iter().filter_map(|p| {
            p.get("PolicyName")
                .or_else(|| p.get("policy_name"))
                .and_then(Value::as_str)
        })
    }
}

/// Anything that can produce enriched user records on demand.
///
/// Implemented by the collector; the analyzer depends on this seam only, so
/// searches that need expanded permissions can be served by a stub in tests.
#[async_trait]
pub trait EnrichmentSource: Send {
    async fn enriched_users(&mut self) -> Vec<EnrichedUser>;
}
