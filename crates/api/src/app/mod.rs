//! HTTP API application wiring (Axum router + auth layers).
//!
//! - `routes/`: HTTP handlers (auth, admin, system)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: structured error bodies, including the unauthorized responder

use std::sync::Arc;

use anyhow::Context;
use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use tokengate_auth::{
    AuthorizationPolicy, CredentialVerifier, PathPattern, PolicyBuilder, PolicyError,
    StaticCredentials, TokenCodec,
};

use crate::config::{AuthConfig, Config};
use crate::middleware::{self, AuthState};

pub mod dto;
pub mod errors;
pub mod routes;

/// Immutable, process-wide state shared by handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub codec: Arc<TokenCodec>,
    pub policy: Arc<AuthorizationPolicy>,
    /// Public paths; the interceptor skips decoding for these.
    pub public: Arc<[PathPattern]>,
    pub verifier: Arc<dyn CredentialVerifier>,
}

impl AppState {
    /// Build state from configuration, using the config-backed credential verifier.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let verifier = StaticCredentials::new(config.auth.users.clone())
            .context("invalid auth.users configuration")?;
        Self::with_verifier(config, Arc::new(verifier))
    }

    pub fn with_verifier(
        config: Config,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        if config.auth.uses_dev_secret() {
            tracing::warn!("auth.secret not set; using insecure development default");
        }
        if config.auth.diagnostics {
            tracing::warn!("diagnostic failure bodies enabled; never run this in production");
        }

        let codec =
            TokenCodec::new(config.auth.secret.as_bytes()).context("invalid signing secret")?;
        let public = config.auth.public_patterns().context("invalid auth.public_paths")?;
        let policy = build_policy(&config.auth).context("invalid policy table")?;
        tracing::info!(
            entries = policy.entries().len(),
            fallback = ?policy.fallback(),
            "authorization policy loaded"
        );

        Ok(Self {
            config: Arc::new(config),
            codec: Arc::new(codec),
            policy: Arc::new(policy),
            public: Arc::from(public),
            verifier,
        })
    }
}

/// Route table, first match wins.
///
/// Configured public prefixes come first so they can never be shadowed.
pub fn build_policy(auth: &AuthConfig) -> Result<AuthorizationPolicy, PolicyError> {
    let builder = auth
        .public_patterns()?
        .iter()
        .fold(PolicyBuilder::new().fallback(auth.fallback), |builder, pattern| {
            builder.public(pattern.as_str())
        });

    builder
        .require("/api/v1/admin/**", ["ADMIN"])
        .authenticated("/api/v1/auth/me")
        .build()
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(config: Config) -> anyhow::Result<Router> {
    Ok(router(AppState::from_config(config)?))
}

pub fn router(state: AppState) -> Router {
    let auth_state = AuthState {
        codec: state.codec.clone(),
        policy: state.policy.clone(),
        bypass: state.public.clone(),
        responder: errors::UnauthorizedResponder::new(state.config.auth.diagnostics),
    };
    let test_token = state.config.auth.test_token;

    // Interception runs first, then policy enforcement, then the handler.
    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/api/v1/auth", routes::auth_router(test_token))
        .nest("/api/v1/admin", routes::admin_router())
        .layer(Extension(state))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    auth_state.clone(),
                    middleware::authenticate,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth_state,
                    middleware::authorize,
                )),
        )
}
