//! Route authorization policy.
//!
//! An ordered table of `pattern + methods -> requirement`, built once at
//! startup and read-only afterwards. The first matching entry decides; if
//! nothing matches, the explicit [`Fallback`] applies.
//!
//! - No IO
//! - No panics
//! - Pure decision: callers render the outcome

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::capability::{Capability, CapabilitySet};
use crate::principal::Principal;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: &'static str },

    #[error("unknown http method '{0}'")]
    UnknownMethod(String),
}

/// HTTP method, kept local so this crate stays transport-agnostic.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl FromStr for Method {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            "OPTIONS" => Ok(Method::Options),
            _ => Err(PolicyError::UnknownMethod(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*`: exactly one segment.
    Any,
    /// `**`: zero or more trailing segments.
    Rest,
}

/// Slash-separated route template, e.g. `/api/v1/clients/*` or `/api/v1/auth/**`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, PolicyError> {
        let invalid = |reason| PolicyError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };

        if !pattern.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }

        let parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let segment = match *part {
                "**" if i + 1 == parts.len() => Segment::Rest,
                "**" => return Err(invalid("'**' is only allowed as the last segment")),
                "*" => Segment::Any,
                "." | ".." => return Err(invalid("relative segments are not allowed")),
                lit if lit.contains('*') => {
                    return Err(invalid("wildcards must span a whole segment"));
                }
                lit => Segment::Literal(lit.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    /// Whether `path` (without query string) matches this pattern.
    ///
    /// Empty segments are ignored, so `/a//b/` matches `/a/b`. Paths carrying
    /// `.` or `..` segments never match.
    pub fn matches(&self, path: &str) -> bool {
        let mut parts = path.split('/').filter(|s| !s.is_empty());
        if path.split('/').any(|s| s == "." || s == "..") {
            return false;
        }

        for segment in &self.segments {
            match segment {
                Segment::Rest => return true,
                Segment::Any => {
                    if parts.next().is_none() {
                        return false;
                    }
                }
                Segment::Literal(lit) => {
                    if parts.next() != Some(lit.as_str()) {
                        return false;
                    }
                }
            }
        }

        parts.next().is_none()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl core::fmt::Display for PathPattern {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for PathPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

/// What a matched entry demands of the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "capabilities", rename_all = "snake_case")]
pub enum Requirement {
    /// No principal needed.
    Public,
    /// Any authenticated principal.
    Authenticated,
    /// Principal must hold every listed capability.
    AllOf(CapabilitySet),
}

impl Requirement {
    /// An empty capability set means the route is public.
    pub fn all_of<I, C>(capabilities: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Capability>,
    {
        let set: CapabilitySet = capabilities.into_iter().map(Into::into).collect();
        if set.is_empty() {
            Requirement::Public
        } else {
            Requirement::AllOf(set)
        }
    }
}

/// Behavior for requests that match no entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    /// Any authenticated principal may reach unlisted routes; anonymous callers are denied.
    #[default]
    Authenticated,
    /// Unlisted routes are denied to everyone.
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyEntry {
    pub pattern: PathPattern,
    /// Empty means "any method".
    pub methods: BTreeSet<Method>,
    pub requirement: Requirement,
}

impl PolicyEntry {
    pub fn new(pattern: &str, requirement: Requirement) -> Result<Self, PolicyError> {
        Ok(Self {
            pattern: PathPattern::parse(pattern)?,
            methods: BTreeSet::new(),
            requirement,
        })
    }

    pub fn with_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = methods.into_iter().collect();
        self
    }

    pub fn matches(&self, path: &str, method: &str) -> bool {
        let method_ok = self.methods.is_empty()
            || method
                .parse::<Method>()
                .map(|m| self.methods.contains(&m))
                .unwrap_or(false);
        method_ok && self.pattern.matches(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// No principal was presented (or it failed to decode).
    Unauthenticated,
    /// A valid principal lacks these capabilities.
    MissingCapabilities(CapabilitySet),
    /// Unlisted route under a deny-all fallback.
    Forbidden,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationPolicy {
    entries: Vec<PolicyEntry>,
    fallback: Fallback,
}

impl AuthorizationPolicy {
    pub fn new(entries: Vec<PolicyEntry>, fallback: Fallback) -> Self {
        Self { entries, fallback }
    }

    pub fn entries(&self) -> &[PolicyEntry] {
        &self.entries
    }

    pub fn fallback(&self) -> Fallback {
        self.fallback
    }

    /// First entry matching `path` and `method`, if any.
    pub fn matching_entry(&self, path: &str, method: &str) -> Option<&PolicyEntry> {
        self.entries.iter().find(|e| e.matches(path, method))
    }

    pub fn check(&self, principal: Option<&Principal>, path: &str, method: &str) -> Decision {
        let Some(entry) = self.matching_entry(path, method) else {
            return match (self.fallback, principal) {
                (Fallback::Authenticated, Some(_)) => Decision::Allow,
                (Fallback::Deny, Some(_)) => Decision::Deny(DenyReason::Forbidden),
                (_, None) => Decision::Deny(DenyReason::Unauthenticated),
            };
        };

        match (&entry.requirement, principal) {
            (Requirement::Public, _) => Decision::Allow,
            (_, None) => Decision::Deny(DenyReason::Unauthenticated),
            (Requirement::Authenticated, Some(_)) => Decision::Allow,
            (Requirement::AllOf(required), Some(p)) => {
                if p.holds_all(required) {
                    Decision::Allow
                } else {
                    let missing: CapabilitySet =
                        required.difference(p.capabilities()).cloned().collect();
                    tracing::debug!(
                        subject = p.subject(),
                        pattern = %entry.pattern,
                        ?missing,
                        "policy denied request"
                    );
                    Decision::Deny(DenyReason::MissingCapabilities(missing))
                }
            }
        }
    }
}

/// Fluent builder; patterns are validated once at [`PolicyBuilder::build`].
#[derive(Debug, Default)]
pub struct PolicyBuilder {
    rules: Vec<(String, Vec<Method>, Requirement)>,
    fallback: Fallback,
}

impl PolicyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn rule(
        mut self,
        pattern: impl Into<String>,
        methods: impl IntoIterator<Item = Method>,
        requirement: Requirement,
    ) -> Self {
        self.rules
            .push((pattern.into(), methods.into_iter().collect(), requirement));
        self
    }

    pub fn public(self, pattern: impl Into<String>) -> Self {
        self.rule(pattern, [], Requirement::Public)
    }

    pub fn authenticated(self, pattern: impl Into<String>) -> Self {
        self.rule(pattern, [], Requirement::Authenticated)
    }

    pub fn require<I, C>(self, pattern: impl Into<String>, capabilities: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Capability>,
    {
        self.rule(pattern, [], Requirement::all_of(capabilities))
    }

    pub fn build(self) -> Result<AuthorizationPolicy, PolicyError> {
        let entries = self
            .rules
            .into_iter()
            .map(|(pattern, methods, requirement)| {
                PolicyEntry::new(&pattern, requirement).map(|e| e.with_methods(methods))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AuthorizationPolicy::new(entries, self.fallback))
    }
}
