//! Flat search records projected from a raw inventory.

use chrono::{DateTime, NaiveDateTime, Utc};
use nhi_domain::identity::IdentityInventory;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Keys older than this are flagged as not rotated.
pub const ROTATION_DAYS: i64 = 90;

const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    User,
    Role,
    Group,
    AccessKey,
    Info,
    Error,
}

/// One search hit: an inventory entry or a system notice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub title: String,
    /// Provider tag: `aws` for inventory entries, `info`/`error` for notices.
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub status: String,
    #[serde(default)]
    pub metadata: Value,
    pub source: String,
    pub category: Category,
    #[serde(rename = "lastAccessed", default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl IdentityRecord {
    pub fn aws(
        category: Category,
        title: impl Into<String>,
        description: impl Into<String>,
        status: impl Into<String>,
        metadata: Value,
    ) -> Self {
        Self {
            title: title.into(),
            kind: "aws".into(),
            description: description.into(),
            status: status.into(),
            metadata,
            source: "aws".into(),
            category,
            last_accessed: None,
            owner: None,
        }
    }

    /// An informational notice; `status` is usually `info` or `warning`.
    pub fn info(title: impl Into<String>, description: impl Into<String>, status: &str) -> Self {
        Self::notice("info", Category::Info, title.into(), description.into(), status)
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::notice("error", Category::Error, title.into(), description.into(), "error")
    }

    fn notice(kind: &str, category: Category, title: String, description: String, status: &str) -> Self {
        Self {
            title,
            kind: kind.into(),
            description,
            status: status.into(),
            metadata: json!({}),
            source: "system".into(),
            category,
            last_accessed: None,
            owner: None,
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Whether this record belongs to, or is, the named user.
    pub fn concerns(&self, user: &str) -> bool {
        self.owner.as_deref() == Some(user) || self.title == user
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Field helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// First non-empty string among `keys`.
pub(crate) fn first_str<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| record.get(*k).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

/// First present, non-null value among `keys`.
pub(crate) fn first_value<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|k| record.get(*k))
        .filter(|v| !v.is_null() && v.as_str() != Some(""))
}

pub(crate) fn key_id(key: &Value) -> Option<&str> {
    first_str(key, &["access_key_id", "AccessKeyId"])
}

pub(crate) fn key_owner(key: &Value) -> Option<&str> {
    first_str(key, &["UserName", "user_name"])
}

pub(crate) fn key_created(key: &Value) -> Option<&Value> {
    first_value(key, &["create_date", "CreateDate"])
}

/// Parse a provider timestamp: RFC 3339 (with `T` or a space), a naive
/// timestamp taken as UTC, or epoch seconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
                return Some(dt.with_timezone(&Utc));
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc())
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
}

/// Whole days elapsed between `then` and `now`.
pub fn age_days(then: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - then).num_days()
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Projection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Project every inventory entry into a record, users first, then roles,
/// groups and access keys.
pub fn project(inventory: &IdentityInventory, now: DateTime<Utc>) -> Vec<IdentityRecord> {
    let mut out = Vec::with_capacity(inventory.total_count());

    for user in &inventory.users {
        let name = first_str(user, &["UserName", "user_name", "name"]).unwrap_or(UNKNOWN);
        out.push(
            IdentityRecord::aws(
                Category::User,
                name,
                format!("AWS IAM User: {name}"),
                "active",
                user.clone(),
            )
            .with_owner(name),
        );
    }

    for role in &inventory.roles {
        let name = first_str(role, &["RoleName", "role_name", "name"]).unwrap_or(UNKNOWN);
        out.push(IdentityRecord::aws(
            Category::Role,
            name,
            format!("AWS IAM Role: {name}"),
            "active",
            role.clone(),
        ));
    }

    for group in &inventory.groups {
        let name = first_str(group, &["GroupName", "group_name", "name"]).unwrap_or(UNKNOWN);
        out.push(IdentityRecord::aws(
            Category::Group,
            name,
            format!("AWS IAM Group: {name}"),
            "active",
            group.clone(),
        ));
    }

    for key in &inventory.access_keys {
        out.push(project_access_key(key, now));
    }

    out
}

fn project_access_key(key: &Value, now: DateTime<Utc>) -> IdentityRecord {
    let id = key_id(key).unwrap_or(UNKNOWN);
    let user = key_owner(key).unwrap_or(UNKNOWN);
    let created = key_created(key);
    let mut status = first_str(key, &["status", "Status"])
        .unwrap_or(UNKNOWN)
        .to_string();

    let mut age_info = String::new();
    match created.map(|c| (c, parse_timestamp(c))) {
        Some((_, Some(dt))) => {
            let age = age_days(dt, now);
            age_info = format!(" (Age: {age} days)");
            if age > ROTATION_DAYS {
                status.push_str(" - OLD");
            }
        }
        Some((raw, None)) => {
            tracing::debug!(access_key_id = id, create_date = %raw, "unparseable key creation date");
        }
        None => {}
    }

    let mut record = IdentityRecord::aws(
        Category::AccessKey,
        format!("{id} ({user})"),
        format!("AWS Access Key: {id} for user {user}{age_info}"),
        status.to_lowercase(),
        key.clone(),
    )
    .with_owner(user);
    record.last_accessed = created.map(display_value);
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn names_fall_back_through_casings() {
        let inv = IdentityInventory {
            users: vec![json!({"user_name": "bob"}), json!({"Arn": "arn:aws:iam::1:user/x"})],
            roles: vec![json!({"name": "deployer"})],
            groups: vec![json!({"GroupName": "ops"})],
            ..IdentityInventory::default()
        };
        let records = project(&inv, now());
        let titles: Vec<_> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["bob", "Unknown", "deployer", "ops"]);
        assert_eq!(records[0].owner.as_deref(), Some("bob"));
        assert_eq!(records[2].owner, None);
        assert_eq!(records[2].description, "AWS IAM Role: deployer");
    }

    #[test]
    fn old_key_is_flagged_and_lowercased() {
        let inv = IdentityInventory {
            access_keys: vec![json!({
                "AccessKeyId": "AKIAOLD",
                "UserName": "alice",
                "Status": "Active",
                "CreateDate": "2024-01-01T00:00:00Z"
            })],
            ..IdentityInventory::default()
        };
        let rec = &project(&inv, now())[0];
        assert_eq!(rec.title, "AKIAOLD (alice)");
        assert_eq!(rec.status, "active - old");
        assert_eq!(rec.description, "AWS Access Key: AKIAOLD for user alice (Age: 152 days)");
        assert_eq!(rec.last_accessed.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(rec.category, Category::AccessKey);
    }

    #[test]
    fn key_without_date_keeps_plain_status() {
        let inv = IdentityInventory {
            access_keys: vec![json!({"access_key_id": "AKIANEW", "status": "Inactive"})],
            ..IdentityInventory::default()
        };
        let rec = &project(&inv, now())[0];
        assert_eq!(rec.title, "AKIANEW (Unknown)");
        assert_eq!(rec.status, "inactive");
        assert!(rec.last_accessed.is_none());
    }

    #[test]
    fn timestamps_in_several_layouts() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        for raw in [
            json!("2024-03-01T12:00:00Z"),
            json!("2024-03-01T12:00:00+00:00"),
            json!("2024-03-01 12:00:00+00:00"),
            json!("2024-03-01T12:00:00"),
            json!(expected.timestamp()),
        ] {
            assert_eq!(parse_timestamp(&raw), Some(expected), "{raw}");
        }
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
    }

    #[test]
    fn record_serializes_with_wire_names() {
        let rec = IdentityRecord::info("Hi", "there", "info");
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["type"], "info");
        assert_eq!(v["category"], "info");
        assert_eq!(v["source"], "system");
        assert!(v.get("lastAccessed").is_none());
        assert!(v.get("owner").is_none());
    }
}
