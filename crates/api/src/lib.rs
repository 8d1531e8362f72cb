//! HTTP API: auth endpoints, request interception and route authorization.

pub mod app;
pub mod config;
pub mod context;
pub mod middleware;
