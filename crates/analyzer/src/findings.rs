//! Queries that need more than the base inventory: enriched users
//! (policies, MFA, key usage) or a comparison across every user's keys.

use chrono::{DateTime, Utc};
use nhi_domain::identity::{EnrichedUser, IdentityInventory};
use serde_json::{json, Value};

use crate::records::{
    age_days, first_value, key_created, key_id, key_owner, parse_timestamp, Category,
    IdentityRecord, ROTATION_DAYS,
};

/// Users listed in the key age ranking.
const RANKING_SHOWN: usize = 5;
/// Users kept in the ranking metadata.
const RANKING_KEPT: usize = 10;

fn display_name(user: &EnrichedUser) -> &str {
    user.user_name().unwrap_or("Unknown")
}

fn user_metadata(user: &EnrichedUser) -> Value {
    serde_json::to_value(user).unwrap_or_else(|_| json!({}))
}

fn is_admin(user: &EnrichedUser) -> bool {
    user.attached_policy_names()
        .any(|name| name.contains("Administrator") || name.to_lowercase().contains("admin"))
        || user
            .inline_policies
            .iter()
            .any(|name| name.to_lowercase().contains("admin"))
}

/// Users with an administrator-like managed policy or an inline policy
/// whose name mentions admin.
pub fn admin_users(users: &[EnrichedUser]) -> Vec<IdentityRecord> {
    users
        .iter()
        .filter(|u| is_admin(u))
        .map(|u| {
            let name = display_name(u);
            IdentityRecord::aws(
                Category::User,
                name,
                format!("AWS IAM User with Admin Access: {name}"),
                "admin",
                user_metadata(u),
            )
            .with_owner(name)
        })
        .collect()
}

/// Users who can sign in to the console but have no MFA device.
pub fn users_without_mfa(users: &[EnrichedUser]) -> Vec<IdentityRecord> {
    users
        .iter()
        .filter(|u| u.has_console_access && !u.has_mfa)
        .map(|u| {
            let name = display_name(u);
            IdentityRecord::aws(
                Category::User,
                name,
                format!("AWS IAM User without MFA (Console Access Enabled): {name}"),
                "warning",
                user_metadata(u),
            )
            .with_owner(name)
        })
        .collect()
}

/// Keys never used, or unused for more than [`ROTATION_DAYS`].
///
/// A last-used date that cannot be parsed is not reported.
pub fn inactive_keys(users: &[EnrichedUser], now: DateTime<Utc>) -> Vec<IdentityRecord> {
    let mut out = Vec::new();
    for user in users {
        let name = display_name(user);
        for key in &user.access_keys_enriched {
            let last_used = key
                .get("last_used")
                .and_then(|lu| first_value(lu, &["LastUsedDate", "last_used_date"]));

            let reason = match last_used {
                None => "Never used".to_string(),
                Some(raw) => match parse_timestamp(raw).map(|dt| age_days(dt, now)) {
                    Some(days) if days > ROTATION_DAYS => format!("Not used in {days} days"),
                    _ => continue,
                },
            };

            let id = key_id(key).unwrap_or("Unknown");
            out.push(
                IdentityRecord::aws(
                    Category::AccessKey,
                    format!("{id} ({name})"),
                    format!("Inactive Access Key: {id} for {name} - {reason}"),
                    "inactive",
                    key.clone(),
                )
                .with_owner(name),
            );
        }
    }
    out
}

/// Raw key records at least `days` old, each with an `age_days` field added.
pub fn old_access_keys(inventory: &IdentityInventory, days: i64, now: DateTime<Utc>) -> Vec<Value> {
    inventory
        .access_keys
        .iter()
        .filter_map(|key| {
            let created = key_created(key)?;
            let Some(dt) = parse_timestamp(created) else {
                tracing::debug!(access_key_id = ?key_id(key), "unparseable key creation date");
                return None;
            };
            let age = age_days(dt, now);
            if age < days {
                return None;
            }
            let mut copy = key.clone();
            if let Some(obj) = copy.as_object_mut() {
                obj.insert("age_days".into(), json!(age));
            }
            Some(copy)
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Oldest-key comparison
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct OldestKey<'a> {
    user: &'a str,
    age_days: i64,
    key_id: Option<&'a str>,
    create_date: &'a Value,
}

/// Each user's oldest key, in first-seen user order.
fn oldest_per_user(inventory: &IdentityInventory, now: DateTime<Utc>) -> Vec<OldestKey<'_>> {
    let mut out: Vec<OldestKey<'_>> = Vec::new();
    for key in &inventory.access_keys {
        let (Some(user), Some(created)) = (key_owner(key), key_created(key)) else {
            continue;
        };
        let Some(dt) = parse_timestamp(created) else {
            continue;
        };
        let entry = OldestKey {
            user,
            age_days: age_days(dt, now),
            key_id: first_str_id(key),
            create_date: created,
        };
        match out.iter_mut().find(|e| e.user == user) {
            Some(existing) if entry.age_days > existing.age_days => *existing = entry,
            Some(_) => {}
            None => out.push(entry),
        }
    }
    out
}

fn first_str_id(key: &Value) -> Option<&str> {
    key_id(key).or_else(|| key.get("key_id").and_then(Value::as_str))
}

/// Whether `current_user` holds the oldest access key across all users,
/// with a ranking of the top users by key age.
pub fn oldest_key_check(
    inventory: &IdentityInventory,
    current_user: &str,
    now: DateTime<Utc>,
) -> IdentityRecord {
    let mut ranking = oldest_per_user(inventory, now);
    if ranking.is_empty() {
        return IdentityRecord::info(
            "No Access Keys Found",
            "No access keys found in the system to compare.",
            "info",
        );
    }
    let Some(mine) = ranking.iter().find(|e| e.user == current_user).map(|e| e.age_days) else {
        return IdentityRecord::info(
            format!("No Keys Found - {current_user}"),
            format!("User '{current_user}' does not have any access keys."),
            "warning",
        );
    };

    // Stable: ties keep first-seen order.
    ranking.sort_by(|a, b| b.age_days.cmp(&a.age_days));
    let oldest = &ranking[0];
    let is_oldest = oldest.user == current_user;

    let mut description = format!("Your access keys are {mine} days old. ");
    let status = if is_oldest {
        match ranking.get(1) {
            Some(next) => description.push_str(&format!(
                "YES - You have the OLDEST access keys among all users. Next oldest: {} ({} days old)",
                next.user, next.age_days
            )),
            None => description.push_str(
                "YES - You have the OLDEST access keys (you are the only user with keys).",
            ),
        }
        "oldest"
    } else {
        description.push_str(&format!(
            "NO - {} has the oldest keys ({} days old). Your keys are {} days newer.",
            oldest.user,
            oldest.age_days,
            oldest.age_days - mine
        ));
        "not-oldest"
    };

    description.push_str("\n\nKey Age Ranking:");
    for (idx, entry) in ranking.iter().take(RANKING_SHOWN).enumerate() {
        let marker = if entry.user == current_user { "-> " } else { "   " };
        description.push_str(&format!(
            "\n{marker}{}. {} - {} days old",
            idx + 1,
            entry.user,
            entry.age_days
        ));
    }
    if ranking.len() > RANKING_SHOWN {
        description.push_str(&format!(
            "\n   ... and {} more users",
            ranking.len() - RANKING_SHOWN
        ));
    }

    let ranked: Vec<Value> = ranking
        .iter()
        .take(RANKING_KEPT)
        .map(|e| {
            json!({
                "user": e.user,
                "age_days": e.age_days,
                "key_id": e.key_id,
                "create_date": e.create_date,
            })
        })
        .collect();

    IdentityRecord::aws(
        Category::AccessKey,
        format!("Access Key Age Check - {current_user}"),
        description,
        status,
        json!({
            "current_user": current_user,
            "current_user_age_days": mine,
            "is_oldest": is_oldest,
            "oldest_user": oldest.user,
            "oldest_age_days": oldest.age_days,
            "ranking": ranked,
        }),
    )
}
