//! Error types for the authz engine.

use thiserror::Error;

/// Errors raised by the authz engine and its collaborators.
///
/// Access denial from [`check`](crate::AuthzEngineClient::check) is expressed as
/// `CheckResult.allowed == false`, not as an error. Only the `*_or_throw`
/// helpers turn a denial into [`AuthzError::PermissionDenied`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthzError {
    /// Malformed permission code or pattern.
    #[error("invalid permission code '{code}': {reason}")]
    InvalidPermissionCode { code: String, reason: String },

    /// A policy definition failed validation.
    #[error("policy '{policy_id}' failed to compile{}: {reason}", rule_suffix(*.rule_index))]
    PolicyCompilation {
        policy_id: String,
        rule_index: Option<usize>,
        reason: String,
    },

    /// A role update would make the role reachable from itself.
    #[error("role '{role_id}' would inherit from itself")]
    CircularInheritance { role_id: String },

    /// Terminal deny decision surfaced by `check_or_throw`.
    #[error("permission '{permission}' denied: {reason}")]
    PermissionDenied { permission: String, reason: String },

    /// Any collaborator I/O failure.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// Uniqueness violation reported by a store.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("scope '{scope_id}' could not be resolved: {reason}")]
    ScopeResolution { scope_id: String, reason: String },

    /// An attribute provider failed to produce a value.
    #[error("attribute unavailable: {0}")]
    AttributeUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

fn rule_suffix(rule_index: Option<usize>) -> String {
    rule_index.map_or_else(String::new, |i| format!(" at rule {i}"))
}

impl AuthzError {
    pub fn invalid_code(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPermissionCode {
            code: code.into(),
            reason: reason.into(),
        }
    }

    pub fn compilation(
        policy_id: impl Into<String>,
        rule_index: Option<usize>,
        reason: impl Into<String>,
    ) -> Self {
        Self::PolicyCompilation {
            policy_id: policy_id.into(),
            rule_index,
            reason: reason.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn scope(scope_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ScopeResolution {
            scope_id: scope_id.into(),
            reason: reason.into(),
        }
    }
}
