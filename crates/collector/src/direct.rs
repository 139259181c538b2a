//! Least-privilege path: `iam:GetUser` and `iam:ListAccessKeys` through the
//! AWS SDK, bypassing the tool server.
//!
//! The tool server's `get_user` also fetches groups, policies and MFA state,
//! which a narrowly scoped principal is not allowed to read.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_iam::config::Credentials;
use aws_sdk_iam::error::DisplayErrorContext;
use aws_sdk_iam::primitives::{DateTime, DateTimeFormat};
use aws_sdk_iam::types::{AccessKeyMetadata, User};
use serde_json::{json, Map, Value};
use tokio::sync::OnceCell;

use nhi_domain::config::AwsConfig;

use crate::error::CollectorError;

/// The two IAM reads the least-privilege path needs, as JSON records using
/// the API's PascalCase field names.
#[async_trait]
pub trait DirectIamApi: Send + Sync {
    async fn get_user(&self, user_name: &str) -> Result<Option<Value>, CollectorError>;
    async fn list_access_keys(&self, user_name: &str) -> Result<Vec<Value>, CollectorError>;
}

/// [`DirectIamApi`] backed by `aws-sdk-iam`. The SDK client is built on
/// first use.
pub struct SdkIamApi {
    aws: AwsConfig,
    client: OnceCell<aws_sdk_iam::Client>,
}

impl SdkIamApi {
    pub fn new(aws: AwsConfig) -> Self {
        Self {
            aws,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> &aws_sdk_iam::Client {
        self.client
            .get_or_init(|| async {
                let mut loader = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(self.aws.region.clone()));
                if let Some((key_id, secret)) = self.aws.static_credentials() {
                    loader = loader.credentials_provider(Credentials::new(
                        key_id, secret, None, None, "nhi-agent",
                    ));
                } else if let Some(profile) = &self.aws.profile {
                    loader = loader.profile_name(profile);
                }
                aws_sdk_iam::Client::new(&loader.load().await)
            })
            .await
    }
}

#[async_trait]
impl DirectIamApi for SdkIamApi {
    async fn get_user(&self, user_name: &str) -> Result<Option<Value>, CollectorError> {
        let out = self
            .client()
            .await
            .get_user()
            .user_name(user_name)
            .send()
            .await
            .map_err(|e| CollectorError::Direct {
                operation: "GetUser",
                message: DisplayErrorContext(&e).to_string(),
            })?;
        Ok(out.user().map(user_to_json))
    }

    async fn list_access_keys(&self, user_name: &str) -> Result<Vec<Value>, CollectorError> {
        let out = self
            .client()
            .await
            .list_access_keys()
            .user_name(user_name)
            .send()
            .await
            .map_err(|e| CollectorError::Direct {
                operation: "ListAccessKeys",
                message: DisplayErrorContext(&e).to_string(),
            })?;
        Ok(out.access_key_metadata().iter().map(key_to_json).collect())
    }
}

fn iso(dt: &DateTime) -> Value {
    dt.fmt(DateTimeFormat::DateTime)
        .map(Value::String)
        .unwrap_or(Value::Null)
}

fn user_to_json(user: &User) -> Value {
    let mut out = Map::new();
    out.insert("UserName".into(), json!(user.user_name()));
    out.insert("UserId".into(), json!(user.user_id()));
    out.insert("Arn".into(), json!(user.arn()));
    out.insert("Path".into(), json!(user.path()));
    out.insert("CreateDate".into(), iso(user.create_date()));
    if let Some(used) = user.password_last_used() {
        out.insert("PasswordLastUsed".into(), iso(used));
    }
    Value::Object(out)
}

fn key_to_json(key: &AccessKeyMetadata) -> Value {
    let mut out = Map::new();
    if let Some(name) = key.user_name() {
        out.insert("UserName".into(), json!(name));
    }
    if let Some(id) = key.access_key_id() {
        out.insert("AccessKeyId".into(), json!(id));
    }
    if let Some(status) = key.status() {
        out.insert("Status".into(), json!(status.as_str()));
    }
    if let Some(created) = key.create_date() {
        out.insert("CreateDate".into(), iso(created));
    }
    Value::Object(out)
}
