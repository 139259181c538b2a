use std::sync::Arc;

use chrono::{DateTime, Utc};
use nhi_domain::config::LlmConfig;
use nhi_domain::error::{Error, Result};
use nhi_domain::identity::{CollectionReport, IdentityInventory};
use nhi_domain::message::Message;
use nhi_providers::{ChatRequest, LlmProvider};
use serde_json::Value;

/// Records listed per category in the LLM context.
pub const CONTEXT_RECORDS_PER_CATEGORY: usize = 10;

pub const NO_IDENTITIES: &str = "No identities loaded. Please collect identities first.";

const SYSTEM_PROMPT: &str = "You are an identity management expert analyzing identity data from AWS systems.
Your task is to answer questions about these identities, their metadata, relationships, and any security concerns.
Be thorough, accurate, and provide specific examples when relevant.";

const SUMMARY_QUESTION: &str = "Provide a comprehensive summary of all identities, including counts by type, \
     key metadata, and notable patterns or relationships.";

const SECURITY_QUESTION: &str = "What security concerns or risks do you see in these identities? \
     Consider issues like overly permissive policies, unused identities, or misconfigurations.";

/// Answers questions about a loaded inventory.
///
/// Keyword search runs locally; free-form questions go to the configured
/// [`LlmProvider`].
pub struct IdentityAnalyzer {
    report: Option<CollectionReport>,
    provider: Option<Arc<dyn LlmProvider>>,
    temperature: f64,
    clock: Option<DateTime<Utc>>,
}

impl Default for IdentityAnalyzer {
    fn default() -> Self {
        Self {
            report: None,
            provider: None,
            temperature: 0.3,
            clock: None,
        }
    }
}

impl IdentityAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Take sampling settings from `[llm]`.
    pub fn with_llm_config(mut self, cfg: &LlmConfig) -> Self {
        self.temperature = cfg.temperature;
        self
    }

    /// Pin "now" for age calculations.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.clock = Some(now);
        self
    }

    pub fn load_identities(&mut self, report: CollectionReport) {
        self.report = Some(report);
    }

    pub fn identities(&self) -> Option<&CollectionReport> {
        self.report.as_ref()
    }

    pub(crate) fn inventory(&self) -> Option<&IdentityInventory> {
        self.report.as_ref().map(|r| &r.aws)
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.unwrap_or_else(Utc::now)
    }

    // ── LLM questions ───────────────────────────────────────────────

    /// Ask a free-form question. `model` overrides the provider default.
    ///
    /// Returns [`NO_IDENTITIES`] without calling the provider when nothing
    /// is loaded.
    pub async fn ask_question(&self, question: &str, model: Option<&str>) -> Result<String> {
        let Some(inventory) = self.inventory() else {
            return Ok(NO_IDENTITIES.to_string());
        };
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| Error::Config("no LLM provider configured".into()))?;

        let user_prompt = format!(
            "Context about identities:\n{}\n\nQuestion: {question}\n\n\
             Please analyze the identity data above and provide a comprehensive answer to the question.",
            build_context(inventory)
        );

        let req = ChatRequest {
            messages: vec![Message::system(SYSTEM_PROMPT), Message::user(user_prompt)],
            temperature: Some(self.temperature),
            model: model.map(String::from),
        };

        tracing::debug!(provider = provider.provider_id(), model = ?model, "asking identity question");
        let resp = provider.chat(&req).await?;
        Ok(resp.content)
    }

    pub async fn summarize_identities(&self, model: Option<&str>) -> Result<String> {
        self.ask_question(SUMMARY_QUESTION, model).await
    }

    pub async fn analyze_security_concerns(&self, model: Option<&str>) -> Result<String> {
        self.ask_question(SECURITY_QUESTION, model).await
    }
}

/// Render the inventory for the LLM, listing at most
/// [`CONTEXT_RECORDS_PER_CATEGORY`] entries per category.
pub fn build_context(inventory: &IdentityInventory) -> String {
    let mut parts = vec!["## AWS Identities".to_string()];
    let sections: [(&str, &str, &[Value]); 4] = [
        ("Users", "users", inventory.users.as_slice()),
        ("Roles", "roles", inventory.roles.as_slice()),
        ("Groups", "groups", inventory.groups.as_slice()),
        ("Access Keys", "access keys", inventory.access_keys.as_slice()),
    ];

    for (heading, noun, records) in sections {
        if records.is_empty() {
            continue;
        }
        parts.push(format!("{heading} ({}):", records.len()));
        for record in records.iter().take(CONTEXT_RECORDS_PER_CATEGORY) {
            let rendered =
                serde_json::to_string_pretty(record).unwrap_or_else(|_| record.to_string());
            parts.push(format!("  - {rendered}"));
        }
        if records.len() > CONTEXT_RECORDS_PER_CATEGORY {
            parts.push(format!(
                "  ... and {} more {noun}",
                records.len() - CONTEXT_RECORDS_PER_CATEGORY
            ));
        }
    }

    parts.join("\n")
}
