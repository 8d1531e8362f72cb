use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use thiserror::Error;

use tokengate_auth::{CredentialError, DenyReason, TokenError};

use crate::context::{AuthOutcome, HeaderState};

/// Errors surfaced by auth handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad credentials")]
    BadCredentials,

    #[error(transparent)]
    Token(#[from] TokenError),
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::BadCredentials | CredentialError::DuplicateUser(_) => {
                ApiError::BadCredentials
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadCredentials => {
                json_error(StatusCode::UNAUTHORIZED, "Unauthorized", "bad credentials")
            }
            ApiError::Token(e) => {
                tracing::error!(error = %e, "token issuance failed");
                json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error",
                    "could not issue token",
                )
            }
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "timestamp": now(),
            "status": status.as_u16(),
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Renders the structured failure body for denied requests.
///
/// `message` is picked from what the caller actually sent, not from the
/// internal failure kind; the kind is only exposed in diagnostic mode.
#[derive(Debug, Copy, Clone, Default)]
pub struct UnauthorizedResponder {
    diagnostics: bool,
}

impl UnauthorizedResponder {
    pub fn new(diagnostics: bool) -> Self {
        Self { diagnostics }
    }

    pub fn diagnostics(&self) -> bool {
        self.diagnostics
    }

    pub fn body(
        &self,
        reason: &DenyReason,
        outcome: &AuthOutcome,
        method: &str,
        path: &str,
    ) -> (StatusCode, Value) {
        let (status, error) = match reason {
            DenyReason::Unauthenticated => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            DenyReason::MissingCapabilities(_) | DenyReason::Forbidden => {
                (StatusCode::FORBIDDEN, "Forbidden")
            }
        };

        let mut body = Map::new();
        body.insert("success".into(), Value::Bool(false));
        body.insert("timestamp".into(), Value::String(now()));
        body.insert("status".into(), json!(status.as_u16()));
        body.insert("error".into(), json!(error));
        body.insert("message".into(), json!(message(reason, outcome)));
        body.insert("path".into(), json!(path));

        if self.diagnostics {
            body.insert("method".into(), json!(method));
            if let AuthOutcome::Anonymous {
                header: HeaderState::Bearer { preview },
                ..
            } = outcome
            {
                body.insert("token".into(), json!(preview));
            }
            if let Some(failure) = outcome.failure() {
                body.insert("failure".into(), json!(failure.kind()));
            }
            if let DenyReason::MissingCapabilities(missing) = reason {
                let names: Vec<&str> = missing.iter().map(|c| c.as_str()).collect();
                body.insert("required".into(), json!(names));
            }
        }

        (status, Value::Object(body))
    }

    pub fn respond(
        &self,
        reason: &DenyReason,
        outcome: &AuthOutcome,
        method: &str,
        path: &str,
    ) -> Response {
        let (status, body) = self.body(reason, outcome, method, path);
        (status, axum::Json(body)).into_response()
    }
}

fn message(reason: &DenyReason, outcome: &AuthOutcome) -> &'static str {
    match reason {
        DenyReason::MissingCapabilities(_) => "insufficient capabilities",
        DenyReason::Forbidden => "route is not accessible",
        DenyReason::Unauthenticated => match outcome {
            AuthOutcome::Anonymous {
                header: HeaderState::WrongScheme,
                ..
            } => "invalid scheme",
            AuthOutcome::Anonymous {
                header: HeaderState::Bearer { .. },
                ..
            } => "invalid or expired token",
            AuthOutcome::Anonymous {
                header: HeaderState::Absent,
                ..
            }
            | AuthOutcome::Authenticated(_) => "token required",
        },
    }
}
