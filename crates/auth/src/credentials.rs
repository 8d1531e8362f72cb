//! Credential verification seam for the issuance path.
//!
//! Storage and hashing policy live outside this crate; the API only needs
//! something that turns `(username, password)` into a verified subject and
//! its raw role string.

use std::collections::HashMap;

use serde::Deserialize;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::capability::map_authorities;
use crate::principal::Principal;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("bad credentials")]
    BadCredentials,

    #[error("duplicate user '{0}'")]
    DuplicateUser(String),
}

/// Outcome of a successful credential check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCredentials {
    pub subject: String,
    /// Raw comma-joined roles, as they will be carried in the token.
    pub roles: String,
}

impl VerifiedCredentials {
    pub fn into_principal(self) -> Principal {
        Principal::new(self.subject, map_authorities(&self.roles))
    }
}

/// External credential verifier contract.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, username: &str, password: &str)
    -> Result<VerifiedCredentials, CredentialError>;
}

/// One configured account for [`StaticCredentials`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, serde::Serialize)]
pub struct UserRecord {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub roles: String,
}

/// Fixed in-memory account list, loaded from configuration.
///
/// Intended for development and tests; production deployments plug in a real
/// verifier behind [`CredentialVerifier`].
#[derive(Clone)]
pub struct StaticCredentials {
    users: HashMap<String, UserRecord>,
}

impl core::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut names: Vec<&str> = self.users.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("StaticCredentials").field("users", &names).finish()
    }
}

impl StaticCredentials {
    pub fn new(records: impl IntoIterator<Item = UserRecord>) -> Result<Self, CredentialError> {
        let mut users = HashMap::new();
        for record in records {
            let key = record.username.to_lowercase();
            if users.contains_key(&key) {
                return Err(CredentialError::DuplicateUser(record.username));
            }
            users.insert(key, record);
        }
        Ok(Self { users })
    }
}

impl CredentialVerifier for StaticCredentials {
    fn verify(
        &self,
        username: &str,
        password: &str,
    ) -> Result<VerifiedCredentials, CredentialError> {
        let Some(record) = self.users.get(&username.to_lowercase()) else {
            return Err(CredentialError::BadCredentials);
        };

        if !bool::from(record.password.as_bytes().ct_eq(password.as_bytes())) {
            return Err(CredentialError::BadCredentials);
        }

        Ok(VerifiedCredentials {
            subject: record.username.clone(),
            roles: record.roles.clone(),
        })
    }
}
