//! Declarative data scopes.
//!
//! A [`ScopeDefinition`] says which rows a subject may see in terms of the
//! request (its tenant, its own id, metadata such as a department). The engine
//! resolves definitions into [`ScopeFilter`]s for the query layer.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use authz_security::{FilterOperator, ScopeFilter, ScopeValue};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ports::ScopeValueResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeType {
    /// Unrestricted.
    All,
    /// Rows of the caller's tenant.
    Tenant,
    Department,
    Team,
    /// Rows owned by the caller.
    #[serde(rename = "self")]
    SelfOwned,
    /// Rows under a hierarchy root, the root included.
    Subordinates,
    Custom,
}

/// Operator of a declared scope condition.
///
/// Everything except `Hierarchy` maps one-to-one onto a [`FilterOperator`].
/// `Hierarchy` expands its value (a root id) into the root plus descendants and
/// emits an `in` filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeOperator {
    Eq,
    Neq,
    In,
    NotIn,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Hierarchy,
}

impl ScopeOperator {
    #[must_use]
    pub fn filter_operator(self) -> Option<FilterOperator> {
        match self {
            Self::Eq => Some(FilterOperator::Eq),
            Self::Neq => Some(FilterOperator::Neq),
            Self::In => Some(FilterOperator::In),
            Self::NotIn => Some(FilterOperator::NotIn),
            Self::Gt => Some(FilterOperator::Gt),
            Self::Gte => Some(FilterOperator::Gte),
            Self::Lt => Some(FilterOperator::Lt),
            Self::Lte => Some(FilterOperator::Lte),
            Self::Like => Some(FilterOperator::Like),
            Self::Hierarchy => None,
        }
    }
}

/// A value read from the request context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContextRef {
    TenantId,
    SubjectId,
    SubjectMetadata(String),
    Attribute(String),
}

impl fmt::Display for ContextRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TenantId => f.write_str("tenant.id"),
            Self::SubjectId => f.write_str("subject.id"),
            Self::SubjectMetadata(key) => write!(f, "subject.metadata.{key}"),
            Self::Attribute(name) => write!(f, "attributes.{name}"),
        }
    }
}

/// Where a scope condition gets its comparison value.
#[derive(Clone)]
pub enum ScopeValueSource {
    Static(ScopeValue),
    Context(ContextRef),
    /// Computed per request; may suspend.
    Resolver(Arc<dyn ScopeValueResolver>),
}

impl fmt::Debug for ScopeValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(v) => f.debug_tuple("Static").field(v).finish(),
            Self::Context(r) => f.debug_tuple("Context").field(r).finish(),
            Self::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

impl From<ScopeValue> for ScopeValueSource {
    fn from(value: ScopeValue) -> Self {
        Self::Static(value)
    }
}

impl From<ContextRef> for ScopeValueSource {
    fn from(r: ContextRef) -> Self {
        Self::Context(r)
    }
}

#[derive(Debug, Clone)]
pub struct ScopeCondition {
    pub field: String,
    pub operator: ScopeOperator,
    pub value: ScopeValueSource,
}

impl ScopeCondition {
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        operator: ScopeOperator,
        value: impl Into<ScopeValueSource>,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScopeDefinition {
    pub id: String,
    pub scope_type: ScopeType,
    pub conditions: Vec<ScopeCondition>,
    /// Higher wins when scopes are combined.
    pub priority: i32,
    /// `false` makes the scope exclusive: when applicable, its filters replace
    /// every other scope's.
    pub combinable: bool,
}

impl ScopeDefinition {
    #[must_use]
    pub fn new(id: impl Into<String>, scope_type: ScopeType) -> Self {
        Self {
            id: id.into(),
            scope_type,
            conditions: Vec::new(),
            priority: 0,
            combinable: true,
        }
    }

    #[must_use]
    pub fn all(id: impl Into<String>) -> Self {
        Self::new(id, ScopeType::All)
    }

    #[must_use]
    pub fn tenant(id: impl Into<String>) -> Self {
        Self::new(id, ScopeType::Tenant)
    }

    /// `field = subject.id`
    #[must_use]
    pub fn owned_by_self(id: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(id, ScopeType::SelfOwned).with_condition(ScopeCondition::new(
            field,
            ScopeOperator::Eq,
            ContextRef::SubjectId,
        ))
    }

    /// `field = subject.metadata[metadata_key]`
    #[must_use]
    pub fn department(
        id: impl Into<String>,
        field: impl Into<String>,
        metadata_key: impl Into<String>,
    ) -> Self {
        Self::new(id, ScopeType::Department).with_condition(ScopeCondition::new(
            field,
            ScopeOperator::Eq,
            ContextRef::SubjectMetadata(metadata_key.into()),
        ))
    }

    /// `field = subject.metadata[metadata_key]`
    #[must_use]
    pub fn team(
        id: impl Into<String>,
        field: impl Into<String>,
        metadata_key: impl Into<String>,
    ) -> Self {
        Self::new(id, ScopeType::Team).with_condition(ScopeCondition::new(
            field,
            ScopeOperator::Eq,
            ContextRef::SubjectMetadata(metadata_key.into()),
        ))
    }

    /// `field in [root, ...descendants(root)]`
    #[must_use]
    pub fn subordinates(
        id: impl Into<String>,
        field: impl Into<String>,
        root: impl Into<ScopeValueSource>,
    ) -> Self {
        Self::new(id, ScopeType::Subordinates).with_condition(ScopeCondition::new(
            field,
            ScopeOperator::Hierarchy,
            root,
        ))
    }

    #[must_use]
    pub fn custom(id: impl Into<String>, conditions: Vec<ScopeCondition>) -> Self {
        Self {
            conditions,
            ..Self::new(id, ScopeType::Custom)
        }
    }

    #[must_use]
    pub fn with_condition(mut self, condition: ScopeCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn exclusive(mut self) -> Self {
        self.combinable = false;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineMode {
    /// Flatten; the query layer ANDs the filters.
    #[default]
    And,
    /// Flatten; the query layer ORs the filters.
    Or,
    /// Only the highest-priority scope that produced filters.
    Priority,
}

impl CombineMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
            Self::Priority => "priority",
        }
    }
}

impl fmt::Display for CombineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CombineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "and" => Ok(Self::And),
            "or" => Ok(Self::Or),
            "priority" => Ok(Self::Priority),
            other => Err(format!("unknown combine mode '{other}'")),
        }
    }
}

/// A definition resolved against one request.
#[derive(Debug, Clone)]
pub struct ResolvedScope {
    pub definition: ScopeDefinition,
    pub filters: Vec<ScopeFilter>,
    pub resolved_at: OffsetDateTime,
}

/// Output of scope resolution, tagged with how the query layer should join it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedScope {
    pub mode: CombineMode,
    pub filters: Vec<ScopeFilter>,
}

impl CombinedScope {
    /// No filters: every row of the queried set is visible.
    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        self.filters.is_empty()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn helpers_declare_expected_conditions() {
        let own = ScopeDefinition::owned_by_self("own", "owner_id");
        assert_eq!(own.scope_type, ScopeType::SelfOwned);
        assert!(matches!(
            own.conditions[0].value,
            ScopeValueSource::Context(ContextRef::SubjectId)
        ));

        let subs = ScopeDefinition::subordinates(
            "subs",
            "department_id",
            ContextRef::SubjectMetadata("department_id".to_owned()),
        )
        .with_priority(10)
        .exclusive();
        assert_eq!(subs.conditions[0].operator, ScopeOperator::Hierarchy);
        assert_eq!(subs.priority, 10);
        assert!(!subs.combinable);
    }

    #[test]
    fn combine_mode_parses_config_labels() {
        assert_eq!("or".parse::<CombineMode>(), Ok(CombineMode::Or));
        assert_eq!(CombineMode::Priority.to_string(), "priority");
        assert!("xor".parse::<CombineMode>().is_err());
    }

    #[test]
    fn hierarchy_has_no_direct_filter_operator() {
        assert_eq!(ScopeOperator::Hierarchy.filter_operator(), None);
        assert_eq!(
            ScopeOperator::NotIn.filter_operator(),
            Some(FilterOperator::NotIn)
        );
    }
}
