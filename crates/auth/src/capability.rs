use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Prefix carried by every normalized capability.
pub const CAPABILITY_PREFIX: &str = "ROLE_";

/// Baseline capability granted when a token carries no roles at all.
pub const BASE_CAPABILITY: &str = "USER";

/// Capability (role) identifier used for route authorization.
///
/// The stored value is always the normalized authority string: uppercased and
/// prefixed with [`CAPABILITY_PREFIX`]. `Capability::new("admin")` and
/// `Capability::new("ROLE_ADMIN")` are therefore the same capability.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(String);

/// Unordered-by-contract capability set (`BTreeSet` so iteration is stable).
pub type CapabilitySet = BTreeSet<Capability>;

impl Capability {
    pub fn new(name: impl AsRef<str>) -> Self {
        let upper = name.as_ref().trim().to_uppercase();
        if upper.starts_with(CAPABILITY_PREFIX) {
            Self(upper)
        } else {
            Self(format!("{CAPABILITY_PREFIX}{upper}"))
        }
    }

    pub fn base() -> Self {
        Self::new(BASE_CAPABILITY)
    }

    /// Full authority string, e.g. `ROLE_ADMIN`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Role name without the prefix, e.g. `ADMIN`.
    pub fn name(&self) -> &str {
        self.0.strip_prefix(CAPABILITY_PREFIX).unwrap_or(&self.0)
    }
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Capability {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Normalize a raw comma-joined role string into a capability set.
///
/// Empty or all-blank input yields the single baseline capability. A bare
/// prefix (`ROLE_`) names no role and is dropped.
pub fn map_authorities(roles: &str) -> CapabilitySet {
    let set: CapabilitySet = roles
        .split(',')
        .map(str::trim)
        .filter(|role| !role.is_empty())
        .map(Capability::new)
        .filter(|capability| !capability.name().is_empty())
        .collect();

    if set.is_empty() {
        tracing::debug!("no roles present, granting baseline capability");
        return CapabilitySet::from([Capability::base()]);
    }

    set
}

/// Join capability names back into the wire `roles` claim (`ADMIN,USER`).
pub fn join_roles(capabilities: &CapabilitySet) -> String {
    capabilities
        .iter()
        .map(Capability::name)
        .collect::<Vec<_>>()
        .join(",")
}
