pub mod health;
pub mod identities;
pub mod query;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use nhi_domain::identity::IdentityInventory;

use crate::state::AppState;

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health::root))
        .route("/api/health", get(health::health))
        .route("/api/identities/collect", post(identities::collect))
        .route("/api/identities/search", post(identities::search))
        .route("/api/query", post(query::query))
}

/// Error body: `{ "detail": "<message>" }`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "detail": self.detail })),
        )
            .into_response()
    }
}

/// Per-category counts reported alongside collection results.
pub(crate) fn counts(inv: &IdentityInventory) -> serde_json::Value {
    serde_json::json!({
        "users": inv.users.len(),
        "roles": inv.roles.len(),
        "groups": inv.groups.len(),
        "access_keys": inv.access_keys.len(),
    })
}
