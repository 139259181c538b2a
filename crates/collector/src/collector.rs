//! Identity collection over one IAM client session.

use async_trait::async_trait;
use serde_json::{Map, Value};

use nhi_domain::config::Config;
use nhi_domain::identity::{
    access_key_id_of, CollectionReport, EnrichedUser, EnrichmentSource, IdentityInventory,
};
use nhi_mcp_client::{McpTransport, StdioTransport};

use crate::iam::{extract_access_keys, AwsIamClient};

/// Owns one IAM client session. Top-level operations never fail; they log
/// and return whatever could be collected.
pub struct IdentityCollector<T = StdioTransport> {
    aws: AwsIamClient<T>,
}

impl IdentityCollector<StdioTransport> {
    pub fn from_config(config: &Config) -> Self {
        Self::new(AwsIamClient::from_config(&config.mcp, &config.aws))
    }
}

impl<T: McpTransport> IdentityCollector<T> {
    pub fn new(aws: AwsIamClient<T>) -> Self {
        Self { aws }
    }

    pub fn client_mut(&mut self) -> &mut AwsIamClient<T> {
        &mut self.aws
    }

    pub async fn collect_aws_identities(&mut self) -> IdentityInventory {
        let inventory = self.aws.get_identity_details().await;
        tracing::info!(
            users = inventory.users.len(),
            roles = inventory.roles.len(),
            groups = inventory.groups.len(),
            access_keys = inventory.access_keys.len(),
            "collected AWS identities"
        );
        inventory
    }

    pub async fn collect_single_user_identities(&mut self, user_name: &str) -> IdentityInventory {
        let inventory = self.aws.get_single_user_identity_details(user_name).await;
        tracing::info!(
            user_name,
            users = inventory.users.len(),
            access_keys = inventory.access_keys.len(),
            "collected single-user identities"
        );
        inventory
    }

    /// Users with policies, MFA, console access and key usage attached.
    /// Each augmentation degrades on its own.
    pub async fn collect_enriched_user_data(&mut self) -> Vec<EnrichedUser> {
        let users = self.aws.list_users().await;
        let mut enriched = Vec::with_capacity(users.len());

        for user in users {
            let Value::Object(record) = user else {
                continue;
            };
            let mut entry = EnrichedUser::from_user(record);
            let Some(name) = entry.user_name().map(str::to_string) else {
                continue;
            };
            self.enrich(&name, &mut entry).await;
            enriched.push(entry);
        }

        tracing::info!(count = enriched.len(), "collected enriched user data");
        enriched
    }

    async fn enrich(&mut self, name: &str, entry: &mut EnrichedUser) {
        match self.aws.list_attached_user_policies(name).await {
            Ok(policies) => entry.attached_policies = policies,
            Err(e) => tracing::warn!(user_name = name, error = %e, "attached policies unavailable"),
        }

        match self.aws.list_user_policies(name).await {
            Ok(policies) => entry.inline_policies = policies,
            Err(e) => tracing::warn!(user_name = name, error = %e, "inline policies unavailable"),
        }

        match self.aws.list_mfa_devices(name).await {
            Ok(devices) => {
                entry.has_mfa = !devices.is_empty();
                entry.mfa_devices = devices;
            }
            Err(e) => tracing::warn!(user_name = name, error = %e, "MFA devices unavailable"),
        }

        match self.aws.get_login_profile(name).await {
            Ok(profile) => {
                entry.has_console_access = !profile.is_empty();
                entry.login_profile = profile;
            }
            Err(e) => tracing::debug!(user_name = name, error = %e, "no console login profile"),
        }

        let details = self.aws.get_user_details(name).await;
        let mut keys = extract_access_keys(&details);
        for key in keys.iter_mut() {
            let Some(key_id) = access_key_id_of(key).map(str::to_string) else {
                continue;
            };
            let last_used = match self.aws.get_access_key_last_used(&key_id).await {
                Ok(info) => info,
                Err(e) => {
                    tracing::warn!(user_name = name, access_key_id = %key_id, error = %e, "key usage unavailable");
                    Map::new()
                }
            };
            if let Some(obj) = key.as_object_mut() {
                obj.insert("last_used".into(), Value::Object(last_used));
            }
        }
        entry.access_keys_enriched = keys;
    }

    /// Full inventory, or the least-privilege single-user inventory when
    /// `single_user` is set.
    pub async fn collect_all_identities(&mut self, single_user: Option<&str>) -> CollectionReport {
        let inventory = match single_user {
            Some(name) => self.collect_single_user_identities(name).await,
            None => self.collect_aws_identities().await,
        };
        CollectionReport::new(inventory)
    }

    pub async fn close(&mut self) {
        self.aws.close().await;
    }
}

#[async_trait]
impl<T: McpTransport> EnrichmentSource for IdentityCollector<T> {
    async fn enriched_users(&mut self) -> Vec<EnrichedUser> {
        self.collect_enriched_user_data().await
    }
}
