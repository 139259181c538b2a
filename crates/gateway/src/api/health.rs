use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "NHI Agent API",
    }))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "aws_configured": state.config.aws.is_configured(),
        "openai_configured": state.llm.is_some(),
    }))
}
