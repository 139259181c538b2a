use axum::extract::State;
use axum::response::Json;
use nhi_analyzer::IdentityAnalyzer;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{counts, ApiError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    /// Model override; the configured default is used when absent.
    #[serde(default)]
    pub model: Option<String>,
}

/// `POST /api/query`
pub async fn query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<Value>, ApiError> {
    let Some(llm) = state.llm.clone() else {
        return Err(ApiError::internal(format!(
            "LLM API key not configured. Set {} in .env",
            state.config.llm.api_key_env
        )));
    };

    let mut collector = state.collectors.collector(&state.config.aws);
    let report = collector.collect_all_identities(None).await;
    collector.close().await;

    let summary = json!({
        "total": report.total_count,
        "aws": counts(&report.aws),
    });

    let mut analyzer = IdentityAnalyzer::new()
        .with_provider(llm)
        .with_llm_config(&state.config.llm);
    analyzer.load_identities(report);

    let answer = analyzer
        .ask_question(&req.query, req.model.as_deref())
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "query failed");
            ApiError::internal(format!("Error processing query: {e}"))
        })?;

    Ok(Json(json!({
        "query": req.query,
        "answer": answer,
        "identities_summary": summary,
    })))
}
