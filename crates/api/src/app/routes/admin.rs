//! Operator endpoints.

use axum::{Json, extract::Extension, response::IntoResponse};

use crate::app::AppState;

/// The ordered policy table and fallback, exactly as evaluated.
pub async fn policy(Extension(state): Extension<AppState>) -> impl IntoResponse {
    Json(state.policy.as_ref().clone())
}
