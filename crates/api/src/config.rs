//! Process configuration.
//!
//! Loaded once at startup and immutable afterwards. Sources, lowest priority
//! first:
//!
//! 1. Built-in defaults (development-friendly)
//! 2. YAML file (`--config`, `TOKENGATE_CONFIG`, default `config.yaml`; optional)
//! 3. Environment variables prefixed with `TOKENGATE_`, nested with `__`
//!
//! ```bash
//! TOKENGATE_AUTH__SECRET="a-long-random-secret"
//! TOKENGATE_AUTH__TOKEN_TTL=3600000
//! TOKENGATE_AUTH__PUBLIC_PATHS='["/health", "/api/v1/auth/login"]'
//! ```

use std::collections::HashSet;
use std::time::Duration;

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::Deserialize;
use thiserror::Error;

use tokengate_auth::{Fallback, PathPattern, PolicyError, UserRecord};
use tokengate_observability::LogFormat;

/// Development-only signing secret. Startup warns loudly when it is in use.
pub const DEV_SECRET: &str = "defaultSecretKeyForDevelopmentOnlyDoNotUseInProduction";

/// 24 hours.
pub const DEFAULT_TOKEN_TTL_MS: u64 = 86_400_000;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "TOKENGATE_CONFIG", default_value = "config.yaml")]
    pub config: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] Box<figment::Error>),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub auth: AuthConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Symmetric signing secret. MUST be overridden outside development.
    pub secret: String,
    /// Token lifetime in milliseconds.
    pub token_ttl: u64,
    /// Path prefixes that skip token interception and are public in the policy.
    pub public_paths: Vec<String>,
    /// Adds request diagnostics to failure bodies. Never enable in production.
    pub diagnostics: bool,
    /// What happens to routes the policy table does not list.
    pub fallback: Fallback,
    /// Mounts `POST /api/v1/auth/token`, which hands out a fixed test token.
    pub test_token: bool,
    /// Accounts for the built-in static credential verifier.
    pub users: Vec<UserRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            auth: AuthConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: DEV_SECRET.to_string(),
            token_ttl: DEFAULT_TOKEN_TTL_MS,
            public_paths: vec![
                "/health".to_string(),
                "/api/v1/auth/login".to_string(),
                "/api/v1/auth/token".to_string(),
                "/api/v1/auth/verify".to_string(),
            ],
            diagnostics: false,
            fallback: Fallback::default(),
            test_token: false,
            users: vec![
                UserRecord {
                    username: "admin".to_string(),
                    password: "admin123".to_string(),
                    roles: "USER,ADMIN".to_string(),
                },
                UserRecord {
                    username: "user".to_string(),
                    password: "user123".to_string(),
                    roles: "USER".to_string(),
                },
            ],
        }
    }
}

impl AuthConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_millis(self.token_ttl)
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.secret == DEV_SECRET
    }

    /// Public prefixes as whole-segment patterns: `/health` covers `/health`
    /// and `/health/live`, never `/healthz`.
    pub fn public_patterns(&self) -> Result<Vec<PathPattern>, PolicyError> {
        self.public_paths
            .iter()
            .map(|prefix| PathPattern::parse(&format!("{}/**", prefix.trim_end_matches('/'))))
            .collect()
    }
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(args).extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("TOKENGATE_").split("__"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.secret.is_empty() {
            return Err(ConfigError::Invalid("auth.secret must not be empty".to_string()));
        }
        if self.auth.token_ttl == 0 {
            return Err(ConfigError::Invalid(
                "auth.token_ttl must be greater than zero".to_string(),
            ));
        }
        if let Some(path) = self.auth.public_paths.iter().find(|p| !p.starts_with('/')) {
            return Err(ConfigError::Invalid(format!(
                "auth.public_paths entry '{path}' must start with '/'"
            )));
        }
        self.auth
            .public_patterns()
            .map_err(|e| ConfigError::Invalid(format!("auth.public_paths: {e}")))?;

        let mut seen = HashSet::new();
        for user in &self.auth.users {
            if !seen.insert(user.username.to_lowercase()) {
                return Err(ConfigError::Invalid(format!(
                    "auth.users contains duplicate username '{}'",
                    user.username
                )));
            }
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
