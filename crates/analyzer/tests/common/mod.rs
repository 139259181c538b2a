#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use nhi_analyzer::IdentityAnalyzer;
use nhi_domain::error::{Error, Result};
use nhi_domain::identity::{CollectionReport, EnrichedUser, EnrichmentSource, IdentityInventory};
use nhi_providers::{ChatRequest, ChatResponse, LlmProvider};
use serde_json::{json, Map};

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

/// alice: admin, console without MFA, one 152-day key never used.
/// bob: console with MFA, one 92-day key used yesterday.
/// svc-deploy: no console, a fresh key.
pub fn inventory() -> IdentityInventory {
    IdentityInventory {
        users: vec![
            json!({"UserName": "alice", "Arn": "arn:aws:iam::111:user/alice"}),
            json!({"UserName": "bob"}),
            json!({"user_name": "svc-deploy"}),
        ],
        roles: vec![json!({"RoleName": "deployer"}), json!({"role_name": "auditor"})],
        groups: vec![json!({"GroupName": "ops"})],
        access_keys: vec![
            json!({"AccessKeyId": "AKIAALICE", "UserName": "alice", "Status": "Active", "CreateDate": "2024-01-01T00:00:00Z"}),
            json!({"AccessKeyId": "AKIABOB", "UserName": "bob", "Status": "Active", "CreateDate": "2024-03-01T00:00:00Z"}),
            json!({"access_key_id": "AKIASVC", "user_name": "svc-deploy", "status": "Active", "create_date": "2024-05-20T00:00:00+00:00"}),
        ],
    }
}

pub fn analyzer() -> IdentityAnalyzer {
    let mut a = IdentityAnalyzer::new().at(now());
    a.load_identities(CollectionReport::new(inventory()));
    a
}

fn enriched(name: &str) -> EnrichedUser {
    let mut m = Map::new();
    m.insert("UserName".into(), json!(name));
    EnrichedUser::from_user(m)
}

pub fn enriched_users() -> Vec<EnrichedUser> {
    let mut alice = enriched("alice");
    alice.attached_policies = vec![json!({"PolicyName": "AdministratorAccess"})];
    alice.has_console_access = true;
    alice.access_keys_enriched = vec![json!({"AccessKeyId": "AKIAALICE", "last_used": {}})];

    let mut bob = enriched("bob");
    bob.has_console_access = true;
    bob.has_mfa = true;
    bob.access_keys_enriched = vec![
        json!({"AccessKeyId": "AKIABOB", "last_used": {"LastUsedDate": "2024-05-31T00:00:00Z"}}),
    ];

    let mut svc = enriched("svc-deploy");
    svc.access_keys_enriched = vec![json!({"AccessKeyId": "AKIASVC", "last_used": {}})];

    vec![alice, bob, svc]
}

/// Serves fixed enriched users and counts fetches.
pub struct StubSource {
    pub users: Vec<EnrichedUser>,
    pub fetches: usize,
}

impl StubSource {
    pub fn new() -> Self {
        Self { users: enriched_users(), fetches: 0 }
    }
}

#[async_trait]
impl EnrichmentSource for StubSource {
    async fn enriched_users(&mut self) -> Vec<EnrichedUser> {
        self.fetches += 1;
        self.users.clone()
    }
}

/// Replies with a fixed answer (or fails) and records each request.
pub struct StubProvider {
    pub answer: std::result::Result<String, String>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl StubProvider {
    pub fn answering(answer: &str) -> Arc<Self> {
        Arc::new(Self { answer: Ok(answer.into()), requests: Mutex::new(Vec::new()) })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self { answer: Err(message.into()), requests: Mutex::new(Vec::new()) })
    }
}

#[async_trait]
impl LlmProvider for StubProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        self.requests.lock().unwrap().push(req.clone());
        match &self.answer {
            Ok(content) => Ok(ChatResponse {
                content: content.clone(),
                model: req.model.clone().unwrap_or_else(|| "stub-model".into()),
                finish_reason: Some("stop".into()),
            }),
            Err(message) => Err(Error::Provider { provider: "stub".into(), message: message.clone() }),
        }
    }

    fn provider_id(&self) -> &str {
        "stub"
    }
}

pub fn titles(records: &[nhi_analyzer::IdentityRecord]) -> Vec<&str> {
    records.iter().map(|r| r.title.as_str()).collect()
}
