use axum::extract::State;
use axum::response::Json;
use nhi_analyzer::{IdentityAnalyzer, IdentityRecord, SearchQuery};
use nhi_domain::config::{user_credential_env_keys, AwsConfig};
use serde::Serialize;
use serde_json::{json, Value};

use super::{counts, ApiError};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<IdentityRecord>,
    pub query: String,
    pub total: usize,
}

/// `POST /api/identities/collect`
pub async fn collect(State(state): State<AppState>) -> Json<Value> {
    let mut collector = state.collectors.collector(&state.config.aws);
    let report = collector.collect_all_identities(None).await;
    collector.close().await;

    tracing::info!(total = report.total_count, "identities collected");

    let c = counts(&report.aws);
    Json(json!({
        "success": true,
        "summary": {
            "total_count": report.total_count,
            "aws_users": c["users"],
            "aws_roles": c["roles"],
            "aws_groups": c["groups"],
            "aws_access_keys": c["access_keys"],
        },
        "identities": report,
    }))
}

/// `POST /api/identities/search`
///
/// In secure mode with a current user, collection runs with that user's
/// own key pair and is restricted to that user.
pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchQuery>,
) -> Result<Json<SearchResponse>, ApiError> {
    let secure_user = req
        .current_user
        .as_deref()
        .filter(|_| req.secure_mode);

    let aws = match secure_user {
        Some(name) => user_credentials(&state.config.aws, name, |k| std::env::var(k).ok())
            .map_err(ApiError::bad_request)?,
        None => state.config.aws.clone(),
    };

    let mut collector = state.collectors.collector(&aws);
    let report = collector.collect_all_identities(secure_user).await;

    let mut analyzer = IdentityAnalyzer::new();
    analyzer.load_identities(report);
    let results = analyzer.search_identities(&req, Some(&mut collector)).await;
    collector.close().await;

    tracing::info!(query = %req.query, user_name = ?req.current_user, hits = results.len(), "search served");

    Ok(Json(SearchResponse {
        total: results.len(),
        query: req.query,
        results,
    }))
}

/// `aws` re-keyed to the per-user pair `AWS_USER_{name}_KEY` /
/// `AWS_USER_{name}_SECRET`.
pub fn user_credentials<F>(aws: &AwsConfig, user_name: &str, lookup: F) -> Result<AwsConfig, String>
where
    F: Fn(&str) -> Option<String>,
{
    let (key_var, secret_var) = user_credential_env_keys(user_name);
    let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
    match (get(&key_var), get(&secret_var)) {
        (Some(key), Some(secret)) => Ok(aws.with_user_credentials(key, secret)),
        _ => Err(format!(
            "User-specific credentials not configured for {user_name}. \
             Set {key_var} and {secret_var} in .env"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_pair_replaces_profile() {
        let base = AwsConfig {
            profile: Some("admin".into()),
            region: "eu-west-1".into(),
            ..AwsConfig::default()
        };
        let aws = user_credentials(&base, "alice", |k| match k {
            "AWS_USER_alice_KEY" => Some("AKIAALICE".into()),
            "AWS_USER_alice_SECRET" => Some("s3cret".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(aws.static_credentials(), Some(("AKIAALICE", "s3cret")));
        assert_eq!(aws.profile, None);
        assert_eq!(aws.region, "eu-west-1");
    }

    #[test]
    fn missing_half_of_pair_is_rejected() {
        let err = user_credentials(&AwsConfig::default(), "bob", |k| {
            (k == "AWS_USER_bob_KEY").then(|| "AKIABOB".to_string())
        })
        .unwrap_err();
        assert!(err.contains("AWS_USER_bob_SECRET"));
    }
}
