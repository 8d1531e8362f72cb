use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use tokengate_auth::{
    AuthorizationPolicy, Decision, PathPattern, Principal, TokenCodec, ValidationError,
};
use tokengate_observability::token_preview;

use crate::app::errors::UnauthorizedResponder;
use crate::context::{AuthOutcome, HeaderState};

const BEARER_PREFIX: &str = "Bearer ";

/// Shared, immutable state for the two auth layers.
#[derive(Clone)]
pub struct AuthState {
    pub codec: Arc<TokenCodec>,
    pub policy: Arc<AuthorizationPolicy>,
    /// Public paths that skip token decoding entirely. The same patterns head
    /// the policy table.
    pub bypass: Arc<[PathPattern]>,
    pub responder: UnauthorizedResponder,
}

impl AuthState {
    fn is_bypassed(&self, path: &str) -> bool {
        self.bypass.iter().any(|pattern| pattern.matches(path))
    }

    /// Derive the authentication outcome for one request.
    ///
    /// Never fails: every problem maps to `AuthOutcome::Anonymous`.
    pub fn resolve(&self, path: &str, headers: &HeaderMap) -> AuthOutcome {
        let (header, token) = extract_bearer(headers);

        if self.is_bypassed(path) {
            return AuthOutcome::Anonymous { header, failure: None };
        }

        let Some(token) = token else {
            return AuthOutcome::Anonymous {
                header,
                failure: Some(ValidationError::Missing),
            };
        };

        decode_outcome(header, path, || self.codec.decode(token))
    }

    fn ensure_outcome<B>(&self, req: &mut Request<B>) {
        if req.extensions().get::<AuthOutcome>().is_some() {
            return;
        }
        let outcome = self.resolve(req.uri().path(), req.headers());
        req.extensions_mut().insert(outcome);
    }
}

/// Run `decode` and fold the result into an outcome. A panic inside `decode`
/// is contained and leaves the caller anonymous.
fn decode_outcome<F>(header: HeaderState, path: &str, decode: F) -> AuthOutcome
where
    F: FnOnce() -> Result<Principal, ValidationError>,
{
    match catch_unwind(AssertUnwindSafe(decode)) {
        Ok(Ok(principal)) => {
            tracing::debug!(subject = principal.subject(), path, "request authenticated");
            AuthOutcome::Authenticated(principal)
        }
        Ok(Err(e)) => {
            tracing::warn!(kind = e.kind(), path, "rejected bearer token");
            AuthOutcome::Anonymous {
                header,
                failure: Some(e),
            }
        }
        Err(_) => {
            tracing::error!(path, "token decoding panicked; continuing unauthenticated");
            AuthOutcome::Anonymous {
                header,
                failure: Some(ValidationError::Malformed),
            }
        }
    }
}

/// Request interceptor: attaches an [`AuthOutcome`] and always continues.
///
/// Accept/reject is left to [`authorize`]. Running it twice is a no-op.
pub async fn authenticate(
    State(state): State<AuthState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    state.ensure_outcome(&mut req);
    next.run(req).await
}

/// Policy enforcement: consults the route table and either continues or
/// terminates with the structured failure body.
pub async fn authorize(
    State(state): State<AuthState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    state.ensure_outcome(&mut req);

    let path = req.uri().path().to_string();
    let method = req.method().as_str().to_string();

    let denial = match req.extensions().get::<AuthOutcome>() {
        Some(outcome) => match state.policy.check(outcome.principal(), &path, &method) {
            Decision::Allow => None,
            Decision::Deny(reason) => Some((reason, outcome.clone())),
        },
        None => None,
    };

    match denial {
        None => next.run(req).await,
        Some((reason, outcome)) => {
            tracing::info!(
                %method,
                %path,
                subject = outcome.principal().map(|p| p.subject()),
                ?reason,
                "request denied"
            );
            state.responder.respond(&reason, &outcome, &method, &path)
        }
    }
}

/// Classify the `Authorization` header and pull out the bearer token, if any.
///
/// The scheme prefix is matched exactly (`"Bearer "`, case-sensitive); any
/// other shape counts as "no token".
fn extract_bearer(headers: &HeaderMap) -> (HeaderState, Option<&str>) {
    let Some(value) = headers.get(axum::http::header::AUTHORIZATION) else {
        return (HeaderState::Absent, None);
    };

    let Ok(value) = value.to_str() else {
        return (HeaderState::WrongScheme, None);
    };

    match value.strip_prefix(BEARER_PREFIX) {
        Some(token) => {
            let token = token.trim();
            (
                HeaderState::Bearer {
                    preview: token_preview(token),
                },
                Some(token),
            )
        }
        None => (HeaderState::WrongScheme, None),
    }
}
