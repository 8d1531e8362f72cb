use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tokengate_auth::{IssuedToken, Principal};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl core::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"[PROTECTED]")
            .finish()
    }
}

/// A missing or `null` token is simply an invalid one.
#[derive(Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub token: Option<String>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub username: String,
    pub roles: String,
    /// Configured ttl, milliseconds.
    pub expires_in: u64,
    pub issued_at: DateTime<Utc>,
}

impl LoginResponse {
    pub fn from_issued(issued: IssuedToken, ttl_ms: u64) -> Self {
        Self {
            username: issued.principal.subject().to_string(),
            roles: issued.principal.roles(),
            token: issued.token,
            token_type: "Bearer",
            expires_in: ttl_ms,
            issued_at: issued.issued_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenStatus {
    Valid,
    Invalid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub valid: bool,
    pub username: Option<String>,
    pub roles: Option<String>,
    pub remaining_time_ms: Option<u64>,
    pub status: TokenStatus,
}

impl VerifyResponse {
    pub fn invalid() -> Self {
        Self {
            valid: false,
            username: None,
            roles: None,
            remaining_time_ms: None,
            status: TokenStatus::Invalid,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub username: String,
    pub roles: String,
    pub capabilities: Vec<String>,
}

impl From<&Principal> for MeResponse {
    fn from(principal: &Principal) -> Self {
        Self {
            username: principal.subject().to_string(),
            roles: principal.roles(),
            capabilities: principal
                .capabilities()
                .iter()
                .map(|c| c.as_str().to_string())
                .collect(),
        }
    }
}
