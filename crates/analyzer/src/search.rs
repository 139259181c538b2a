//! Keyword search over the loaded inventory.
//!
//! Queries are matched against fixed phrase sets in priority order; the
//! first matching intent decides the result set. Intents that need
//! enriched users pull them from an [`EnrichmentSource`] at most once per
//! search.

use std::sync::OnceLock;

use nhi_domain::identity::{EnrichedUser, EnrichmentSource};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::analyzer::IdentityAnalyzer;
use crate::findings;
use crate::records::{self, age_days, key_created, parse_timestamp, Category, IdentityRecord, ROTATION_DAYS};

/// Cap on category search results.
pub const MAX_RESULTS: usize = 20;

/// Age threshold for "old key" category queries without an explicit "N days".
pub const DEFAULT_AGE_THRESHOLD_DAYS: i64 = 30;

const MY_KEYS: &[&str] = &["my access key", "my keys"];
const OLDEST: &[&str] = &["oldest", "old"];
const ADMIN: &[&str] = &["admin access", "administrator", "overprivileged", "admin users"];
const NO_MFA: &[&str] = &["without mfa", "no mfa", "mfa status", "missing mfa"];
const RISK: &[&str] = &["security risk", "vulnerable", "at risk", "security posture"];
const INACTIVE: &[&str] = &["inactive user", "unused", "not used", "last used"];
const AGED: &[&str] = &["not rotated", "old", "expired"];

/// A search request as received from a caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    /// IAM user name the caller acts as; narrows results to that user.
    #[serde(default)]
    pub current_user: Option<String>,
    /// Set when the inventory was collected with the user's own credentials.
    #[serde(default)]
    pub secure_mode: bool,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn as_user(mut self, user: impl Into<String>) -> Self {
        self.current_user = Some(user.into());
        self
    }

    pub fn secure(mut self) -> Self {
        self.secure_mode = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    MyKeysOldest,
    MyKeysNeedsUser,
    Admin,
    NoMfa,
    SecurityRisk,
    Inactive,
    Category(Category),
    Unsupported,
}

fn has_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn classify(q: &str, has_user: bool) -> Intent {
    if has_any(q, MY_KEYS) {
        if !has_user {
            return Intent::MyKeysNeedsUser;
        }
        if has_any(q, OLDEST) {
            return Intent::MyKeysOldest;
        }
    }
    if has_any(q, ADMIN) {
        return Intent::Admin;
    }
    if has_any(q, NO_MFA) {
        return Intent::NoMfa;
    }
    if has_any(q, RISK) {
        return Intent::SecurityRisk;
    }
    if has_any(q, INACTIVE) {
        return Intent::Inactive;
    }
    requested_category(q).map_or(Intent::Unsupported, Intent::Category)
}

fn requested_category(q: &str) -> Option<Category> {
    let mentions_user = q.contains(" user") || q.contains("users") || q.starts_with("user");
    if mentions_user && !q.contains("role") {
        Some(Category::User)
    } else if (q.contains(" role") || q.contains("roles")) && !q.contains("user") {
        Some(Category::Role)
    } else if q.contains(" group") || q.contains("groups") {
        Some(Category::Group)
    } else if has_any(q, &["access key", "access_key", "accesskey"]) {
        Some(Category::AccessKey)
    } else {
        None
    }
}

/// `N days` / `N day` in the query, else [`DEFAULT_AGE_THRESHOLD_DAYS`].
fn age_threshold(q: &str) -> i64 {
    static DAYS: OnceLock<Option<Regex>> = OnceLock::new();
    DAYS.get_or_init(|| Regex::new(r"(\d+)\s*days?").ok())
        .as_ref()
        .and_then(|re| re.captures(q))
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(DEFAULT_AGE_THRESHOLD_DAYS)
}

/// Enriched users fetched lazily, once.
struct Enrichment<'a> {
    source: Option<&'a mut dyn EnrichmentSource>,
    users: Option<Vec<EnrichedUser>>,
}

impl<'a> Enrichment<'a> {
    async fn users(&mut self) -> &[EnrichedUser] {
        if self.users.is_none() {
            let users = match self.source.as_deref_mut() {
                Some(source) => source.enriched_users().await,
                None => Vec::new(),
            };
            self.users = Some(users);
        }
        self.users.as_deref().unwrap_or_default()
    }
}

impl IdentityAnalyzer {
    /// Search the loaded inventory.
    ///
    /// `source` backs the admin, MFA, security-risk and inactive-key
    /// queries; without one those return nothing.
    pub async fn search_identities(
        &self,
        query: &SearchQuery,
        source: Option<&mut dyn EnrichmentSource>,
    ) -> Vec<IdentityRecord> {
        let Some(inventory) = self.inventory() else {
            return Vec::new();
        };
        let now = self.now();
        let q = query.query.to_lowercase();
        let user = query.current_user.as_deref();
        let intent = classify(&q, user.is_some());
        let mut enrichment = Enrichment { source, users: None };

        tracing::debug!(query = %query.query, user_name = ?user, secure_mode = query.secure_mode, ?intent, "identity search");

        let results = match intent {
            Intent::MyKeysNeedsUser => {
                return vec![IdentityRecord::info(
                    "User Identity Required",
                    "Please select your AWS IAM user from the dropdown to check your access keys.",
                    "info",
                )];
            }
            Intent::MyKeysOldest => {
                if query.secure_mode {
                    return vec![IdentityRecord::error(
                        "Insufficient Permissions",
                        "Cannot perform this action as you don't have permissions for it. \
                         This query requires listing all users, which is not available with \
                         user-specific credentials.",
                    )];
                }
                // Comparative: needs every user's keys, so never narrowed.
                let me = user.unwrap_or_default();
                return vec![findings::oldest_key_check(inventory, me, now)];
            }
            Intent::Admin => findings::admin_users(enrichment.users().await),
            Intent::NoMfa => findings::users_without_mfa(enrichment.users().await),
            Intent::SecurityRisk => {
                let users = enrichment.users().await;
                let mut risks = findings::users_without_mfa(users);
                risks.extend(findings::admin_users(users).into_iter().map(|mut r| {
                    r.description = format!("High-privilege account: {}", r.title);
                    r.status = "high-privilege".into();
                    r
                }));
                let records = records::project(inventory, now);
                risks.extend(
                    keys_at_least(records, ROTATION_DAYS, now)
                        .into_iter()
                        .take(MAX_RESULTS)
                        .map(|mut r| {
                            r.description = format!("Old access key: {}", r.title);
                            r.status = "old-credential".into();
                            r
                        }),
                );
                risks
            }
            Intent::Inactive => {
                let hits = findings::inactive_keys(enrichment.users().await, now);
                return match user {
                    Some(u) => hits.into_iter().filter(|r| r.owner.as_deref() == Some(u)).collect(),
                    None => hits,
                };
            }
            Intent::Category(category) => {
                return category_search(&q, category, user, records::project(inventory, now), now);
            }
            Intent::Unsupported => return Vec::new(),
        };

        match user {
            Some(u) => results.into_iter().filter(|r| r.concerns(u)).collect(),
            None => results,
        }
    }

    /// Raw key records at least `days` old, with `age_days` attached.
    pub fn get_old_access_keys(&self, days: i64) -> Vec<Value> {
        match self.inventory() {
            Some(inv) => findings::old_access_keys(inv, days, self.now()),
            None => Vec::new(),
        }
    }
}

fn category_search(
    q: &str,
    category: Category,
    user: Option<&str>,
    records: Vec<IdentityRecord>,
    now: chrono::DateTime<chrono::Utc>,
) -> Vec<IdentityRecord> {
    let mut filtered: Vec<IdentityRecord> = records
        .into_iter()
        .filter(|r| r.category == category)
        .collect();

    // Roles and groups have no owner.
    if let Some(u) = user {
        match category {
            Category::User => filtered.retain(|r| r.concerns(u)),
            Category::AccessKey => filtered.retain(|r| r.owner.as_deref() == Some(u)),
            _ => {}
        }
    }

    if category == Category::AccessKey && has_any(q, AGED) {
        filtered = keys_at_least(filtered, age_threshold(q), now);
    }

    filtered.truncate(MAX_RESULTS);
    filtered
}

/// Access-key records whose creation date is at least `days` ago.
fn keys_at_least(
    records: Vec<IdentityRecord>,
    days: i64,
    now: chrono::DateTime<chrono::Utc>,
) -> Vec<IdentityRecord> {
    records
        .into_iter()
        .filter(|r| r.category == Category::AccessKey)
        .filter(|r| {
            key_created(&r.metadata)
                .and_then(parse_timestamp)
                .is_some_and(|dt| age_days(dt, now) >= days)
        })
        .collect()
}
