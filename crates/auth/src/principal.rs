use serde::Serialize;

use crate::capability::{Capability, CapabilitySet, join_roles};

/// Verified identity for a single request.
///
/// Only constructed from a successfully decoded token (or, on the issuance
/// path, from verified credentials); never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    subject: String,
    capabilities: CapabilitySet,
}

impl Principal {
    pub fn new(subject: impl Into<String>, capabilities: CapabilitySet) -> Self {
        Self {
            subject: subject.into(),
            capabilities,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn has(&self, capability: &Capability) -> bool {
        self.capabilities.contains(capability)
    }

    /// Whether every capability in `required` is held.
    pub fn holds_all(&self, required: &CapabilitySet) -> bool {
        required.is_subset(&self.capabilities)
    }

    /// Comma-joined role names, as carried in the `roles` claim.
    pub fn roles(&self) -> String {
        join_roles(&self.capabilities)
    }
}
