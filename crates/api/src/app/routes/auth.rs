//! Token issuance and verification endpoints.

use axum::{Json, extract::Extension};

use tokengate_auth::{Principal, map_authorities};

use crate::app::{
    AppState,
    dto::{LoginRequest, LoginResponse, MeResponse, TokenStatus, VerifyRequest, VerifyResponse},
    errors::ApiError,
};
use crate::context::CurrentPrincipal;

/// Subject and roles handed out by the test-token shortcut.
pub const TEST_SUBJECT: &str = "testuser";
pub const TEST_ROLES: &str = "USER,ADMIN";

pub async fn login(
    Extension(state): Extension<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let verified = match state.verifier.verify(&req.username, &req.password) {
        Ok(verified) => verified,
        Err(e) => {
            tracing::warn!(username = %req.username, "login failed");
            return Err(e.into());
        }
    };

    let principal = verified.into_principal();
    let issued = state.codec.issue(&principal, state.config.auth.token_ttl())?;
    tracing::info!(username = principal.subject(), "login succeeded");

    Ok(Json(LoginResponse::from_issued(issued, state.config.auth.token_ttl)))
}

pub async fn test_token(
    Extension(state): Extension<AppState>,
) -> Result<Json<LoginResponse>, ApiError> {
    let principal = Principal::new(TEST_SUBJECT, map_authorities(TEST_ROLES));
    let issued = state.codec.issue(&principal, state.config.auth.token_ttl())?;
    tracing::info!("issued test token");

    Ok(Json(LoginResponse::from_issued(issued, state.config.auth.token_ttl)))
}

/// Always 200; validity is reported in the body. An unreadable body counts as
/// an invalid token.
pub async fn verify(
    Extension(state): Extension<AppState>,
    req: Option<Json<VerifyRequest>>,
) -> Json<VerifyResponse> {
    let token = req.and_then(|Json(req)| req.token).unwrap_or_default();

    match state.codec.inspect(&token) {
        Ok(info) => Json(VerifyResponse {
            valid: true,
            username: Some(info.principal.subject().to_string()),
            roles: Some(info.roles),
            remaining_time_ms: Some(info.remaining_ms),
            status: TokenStatus::Valid,
        }),
        Err(e) => {
            tracing::debug!(kind = e.kind(), "verification reported invalid token");
            Json(VerifyResponse::invalid())
        }
    }
}

pub async fn me(CurrentPrincipal(principal): CurrentPrincipal) -> Json<MeResponse> {
    Json(MeResponse::from(&principal))
}
