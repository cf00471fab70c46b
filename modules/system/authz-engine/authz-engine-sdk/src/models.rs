//! Domain models for the authz engine.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use authz_security::{RequestContext, SubjectType};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::permission::{self, PermissionSet};

// ============================================================================
// Roles and bindings
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleType {
    /// Platform-provided; not deletable by tenant admins.
    System,
    #[default]
    Custom,
    Template,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleStatus {
    #[default]
    Active,
    Inactive,
    Archived,
}

/// A tenant-owned role. `name` and `role_type` are fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub role_type: RoleType,
    pub status: RoleStatus,
    /// Permission codes or wildcard patterns.
    pub permissions: Vec<String>,
    /// Ids of roles whose permissions this role inherits.
    pub inherits: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl RoleDefinition {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == RoleStatus::Active
    }
}

/// Input for role creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRole {
    pub tenant_id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub role_type: RoleType,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub inherits: Vec<String>,
}

impl NewRole {
    #[must_use]
    pub fn new(tenant_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_permissions<S: Into<String>>(mut self, permissions: impl IntoIterator<Item = S>) -> Self {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_inherits<S: Into<String>>(mut self, inherits: impl IntoIterator<Item = S>) -> Self {
        self.inherits = inherits.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_type(mut self, role_type: RoleType) -> Self {
        self.role_type = role_type;
        self
    }
}

/// Name-preserving role update. Name and type are immutable, so they have no
/// field here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RoleStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits: Option<Vec<String>>,
}

/// Listing filter for roles within one tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleFilter {
    pub status: Option<RoleStatus>,
    pub role_type: Option<RoleType>,
}

impl RoleFilter {
    #[must_use]
    pub fn matches(&self, role: &RoleDefinition) -> bool {
        self.status.is_none_or(|s| s == role.status)
            && self.role_type.is_none_or(|t| t == role.role_type)
    }
}

/// Edge between a subject and a role. Unique on
/// `(tenant_id, subject_type, subject_id, role_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBinding {
    pub id: String,
    pub tenant_id: String,
    pub role_id: String,
    pub subject_type: SubjectType,
    pub subject_id: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl RoleBinding {
    /// A binding stops counting once `expires_at <= now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoleBinding {
    pub tenant_id: String,
    pub role_id: String,
    pub subject_type: SubjectType,
    pub subject_id: String,
    pub expires_at: Option<OffsetDateTime>,
}

impl NewRoleBinding {
    #[must_use]
    pub fn new(
        tenant_id: impl Into<String>,
        role_id: impl Into<String>,
        subject_type: SubjectType,
        subject_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            role_id: role_id.into(),
            subject_type,
            subject_id: subject_id.into(),
            expires_at: None,
        }
    }

    #[must_use]
    pub fn expires_at(mut self, at: OffsetDateTime) -> Self {
        self.expires_at = Some(at);
        self
    }
}

/// Fully expanded permission set of one subject. Derived, never authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePermissions {
    pub tenant_id: String,
    pub subject_id: String,
    pub subject_type: SubjectType,
    /// Names of the active roles that contributed, in traversal order.
    pub roles: Vec<String>,
    pub permissions: PermissionSet,
    #[serde(with = "time::serde::rfc3339")]
    pub computed_at: OffsetDateTime,
}

impl EffectivePermissions {
    #[must_use]
    pub fn empty(tenant_id: &str, subject_type: SubjectType, subject_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_owned(),
            subject_id: subject_id.to_owned(),
            subject_type,
            roles: Vec::new(),
            permissions: PermissionSet::new(),
            computed_at: OffsetDateTime::now_utc(),
        }
    }

    /// The granting entry for `code`, if any (exact, `resource:*`, `*:action` or `*`).
    #[must_use]
    pub fn grant_for(&self, code: &str) -> Option<&str> {
        permission::find_match(code, &self.permissions)
    }
}

// ============================================================================
// Checks
// ============================================================================

/// One permission question: may this request perform `action` on `resource`
/// (optionally a specific instance)?
#[derive(Debug, Clone)]
pub struct CheckContext {
    pub request: RequestContext,
    pub resource: String,
    pub action: String,
    pub resource_id: Option<String>,
}

impl CheckContext {
    #[must_use]
    pub fn new(request: RequestContext, resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            request,
            resource: resource.into(),
            action: action.into(),
            resource_id: None,
        }
    }

    #[must_use]
    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn permission(&self) -> String {
        permission::encode(&self.resource, &self.action)
    }
}

/// Why a check ended the way it did. `Display` yields the reason string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionReason {
    /// System subjects pass every check.
    System,
    /// Granted by the subject's direct permission list.
    DirectPermission,
    /// Granted by an entry of the effective permission set.
    Granted { grant: String },
    /// No entry of the effective permission set matches.
    NotGranted,
    /// A compiled policy rule decided the outcome.
    Policy {
        policy_id: String,
        rule_index: usize,
        effect: Effect,
    },
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("system"),
            Self::DirectPermission => f.write_str("direct permission"),
            Self::Granted { grant } => write!(f, "granted by '{grant}'"),
            Self::NotGranted => f.write_str("no matching permission"),
            Self::Policy {
                policy_id,
                rule_index,
                effect,
            } => write!(f, "policy '{policy_id}' rule {rule_index}: {effect}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub allowed: bool,
    pub permission: String,
    pub reason: DecisionReason,
    /// Observability only; not part of the decision.
    pub evaluation_time: Duration,
}

impl CheckResult {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn evaluation_time_ms(&self) -> f64 {
        self.evaluation_time.as_secs_f64() * 1000.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCheckResult {
    /// Keyed by permission code.
    pub results: BTreeMap<String, CheckResult>,
    pub all_allowed: bool,
    pub any_allowed: bool,
}

impl BatchCheckResult {
    #[must_use]
    pub fn from_results(results: impl IntoIterator<Item = CheckResult>) -> Self {
        let results: BTreeMap<String, CheckResult> = results
            .into_iter()
            .map(|r| (r.permission.clone(), r))
            .collect();
        let all_allowed = results.values().all(|r| r.allowed);
        let any_allowed = results.values().any(|r| r.allowed);
        Self {
            results,
            all_allowed,
            any_allowed,
        }
    }

    #[must_use]
    pub fn denied(&self) -> Vec<&str> {
        self.results
            .values()
            .filter(|r| !r.allowed)
            .map(|r| r.permission.as_str())
            .collect()
    }
}

// ============================================================================
// Policies (shared enums; definitions live in `policy`)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allow" => Some(Self::Allow),
            "deny" => Some(Self::Deny),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_allow(self) -> bool {
        self == Self::Allow
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        })
    }
}

/// Named priority levels and their scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    /// Unrecognized or missing labels fall back to `Normal`.
    #[must_use]
    pub fn from_label(label: Option<&str>) -> Self {
        match label {
            Some("low") => Self::Low,
            Some("high") => Self::High,
            Some("critical") => Self::Critical,
            _ => Self::Normal,
        }
    }

    #[must_use]
    pub fn score(self) -> u32 {
        match self {
            Self::Low => 10,
            Self::Normal => 50,
            Self::High => 100,
            Self::Critical => 1000,
        }
    }
}

// ============================================================================
// Cache statistics
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub evictions: u64,
    /// `hits / (hits + misses)`, `0.0` before the first lookup.
    pub hit_rate: f64,
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use authz_security::Subject;

    use super::*;

    fn result(permission: &str, allowed: bool) -> CheckResult {
        CheckResult {
            allowed,
            permission: permission.to_owned(),
            reason: if allowed {
                DecisionReason::DirectPermission
            } else {
                DecisionReason::NotGranted
            },
            evaluation_time: Duration::from_micros(1500),
        }
    }

    #[test]
    fn priority_labels_and_scores() {
        assert_eq!(Priority::from_label(Some("critical")).score(), 1000);
        assert_eq!(Priority::from_label(Some("high")).score(), 100);
        assert_eq!(Priority::from_label(Some("low")).score(), 10);
        assert_eq!(Priority::from_label(Some("urgent")), Priority::Normal);
        assert_eq!(Priority::from_label(None).score(), 50);
    }

    #[test]
    fn binding_expiry_is_inclusive() {
        let now = OffsetDateTime::now_utc();
        let binding = RoleBinding {
            id: "b1".to_owned(),
            tenant_id: "t1".to_owned(),
            role_id: "r1".to_owned(),
            subject_type: SubjectType::User,
            subject_id: "u1".to_owned(),
            expires_at: Some(now),
            created_at: now,
        };
        assert!(binding.is_expired_at(now));
        assert!(!binding.is_expired_at(now - time::Duration::seconds(1)));
    }

    #[test]
    fn batch_result_aggregates() {
        let batch = BatchCheckResult::from_results([
            result("order:read", true),
            result("order:delete", false),
        ]);
        assert!(!batch.all_allowed);
        assert!(batch.any_allowed);
        assert_eq!(batch.denied(), vec!["order:delete"]);
        assert!((batch.results["order:read"].evaluation_time_ms() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn decision_reason_strings() {
        assert_eq!(DecisionReason::System.to_string(), "system");
        assert_eq!(
            DecisionReason::Granted {
                grant: "order:*".to_owned()
            }
            .to_string(),
            "granted by 'order:*'"
        );
        assert_eq!(
            DecisionReason::Policy {
                policy_id: "p1".to_owned(),
                rule_index: 0,
                effect: Effect::Deny
            }
            .to_string(),
            "policy 'p1' rule 0: deny"
        );
    }

    #[test]
    fn check_context_encodes_permission() {
        let request = RequestContext::builder()
            .tenant_id("t1")
            .subject(Subject::user("u1"))
            .build();
        let ctx = CheckContext::new(request, "order", "confirm").with_resource_id("o-1");
        assert_eq!(ctx.permission(), "order:confirm");
        assert_eq!(ctx.resource_id.as_deref(), Some("o-1"));
    }
}
