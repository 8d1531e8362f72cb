use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::Response,
};

use tokengate_auth::{Principal, ValidationError};

use crate::app::errors;

/// What the `Authorization` header looked like, independent of token validity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderState {
    Absent,
    /// Present but not `Bearer <token>` (or not valid UTF-8).
    WrongScheme,
    /// Bearer scheme; only a truncated preview of the token is kept.
    Bearer { preview: String },
}

/// Request-scoped authentication result, inserted by the interceptor.
///
/// Lives in the request's extensions and is read-only for everything
/// downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated(Principal),
    Anonymous {
        header: HeaderState,
        failure: Option<ValidationError>,
    },
}

impl AuthOutcome {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            AuthOutcome::Authenticated(principal) => Some(principal),
            AuthOutcome::Anonymous { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<ValidationError> {
        match self {
            AuthOutcome::Authenticated(_) => None,
            AuthOutcome::Anonymous { failure, .. } => *failure,
        }
    }
}

/// Extractor for handlers behind an authenticated policy entry.
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<AuthOutcome>() {
            Some(AuthOutcome::Authenticated(principal)) => Ok(Self(principal.clone())),
            _ => Err(errors::json_error(
                StatusCode::UNAUTHORIZED,
                "Unauthorized",
                "token required",
            )),
        }
    }
}
