//! `tokengate-auth`: stateless token authentication and route authorization.
//!
//! Knows nothing about HTTP or storage: it signs and verifies tokens, normalizes
//! role strings into capabilities, and decides whether a (possibly anonymous)
//! caller may reach a route.

pub mod capability;
pub mod credentials;
pub mod policy;
pub mod principal;
pub mod token;

pub use capability::{
    BASE_CAPABILITY, CAPABILITY_PREFIX, Capability, CapabilitySet, map_authorities,
};
pub use credentials::{
    CredentialError, CredentialVerifier, StaticCredentials, UserRecord, VerifiedCredentials,
};
pub use policy::{
    AuthorizationPolicy, Decision, DenyReason, Fallback, Method, PathPattern, PolicyBuilder,
    PolicyEntry, PolicyError, Requirement,
};
pub use principal::Principal;
pub use token::{IssuedToken, TokenCodec, TokenError, TokenInfo, ValidationError};
