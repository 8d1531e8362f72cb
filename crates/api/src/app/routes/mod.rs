use axum::{
    Router,
    routing::{get, post},
};

pub mod admin;
pub mod auth;
pub mod system;

/// Auth endpoints, nested under `/api/v1/auth`.
pub fn auth_router(test_token: bool) -> Router {
    let router = Router::new()
        .route("/login", post(auth::login))
        .route("/verify", post(auth::verify))
        .route("/me", get(auth::me));

    if test_token {
        router.route("/token", post(auth::test_token))
    } else {
        router
    }
}

/// Operator endpoints, nested under `/api/v1/admin`.
pub fn admin_router() -> Router {
    Router::new().route("/policy", get(admin::policy))
}
