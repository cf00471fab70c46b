use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A scalar (or list) value for scope filtering.
///
/// JSON conversion happens at the boundary (see [`ScopeValue::from_json`]),
/// not inside the filter model.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScopeValue {
    /// UUID value (tenant IDs, resource IDs, etc.)
    Uuid(Uuid),
    /// String value (status, department codes, etc.)
    String(String),
    /// Integer value.
    Int(i64),
    /// Boolean value.
    Bool(bool),
    /// Value set, produced by `in` filters and hierarchy expansion.
    List(Vec<ScopeValue>),
}

impl ScopeValue {
    /// Try to extract a UUID from this value.
    ///
    /// Returns `Some` for `ScopeValue::Uuid` directly, and for
    /// `ScopeValue::String` if the string is a valid UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Uuid(u) => Some(*u),
            Self::String(s) => Uuid::parse_str(s).ok(),
            Self::Int(_) | Self::Bool(_) | Self::List(_) => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a JSON value. Nulls, objects and non-integer numbers have no
    /// scope representation and yield `None`.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(Self::String(s.clone())),
            serde_json::Value::Number(n) => n.as_i64().map(Self::Int),
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Array(items) => items
                .iter()
                .map(Self::from_json)
                .collect::<Option<Vec<_>>>()
                .map(Self::List),
            serde_json::Value::Null | serde_json::Value::Object(_) => None,
        }
    }
}

impl fmt::Display for ScopeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uuid(u) => write!(f, "{u}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::List(values) => {
                f.write_str("[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<Uuid> for ScopeValue {
    #[inline]
    fn from(u: Uuid) -> Self {
        Self::Uuid(u)
    }
}

impl From<String> for ScopeValue {
    #[inline]
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for ScopeValue {
    #[inline]
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<i64> for ScopeValue {
    #[inline]
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for ScopeValue {
    #[inline]
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<V: Into<ScopeValue>> From<Vec<V>> for ScopeValue {
    fn from(values: Vec<V>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// Comparison operator of a [`ScopeFilter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Eq,
    Neq,
    In,
    NotIn,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
}

impl FilterOperator {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Like => "like",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single row-level filter: `field <operator> value`.
///
/// The field name is an authorization concept; mapping it to a column is the
/// query layer's job.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeFilter {
    field: String,
    operator: FilterOperator,
    value: ScopeValue,
}

impl ScopeFilter {
    #[must_use]
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: impl Into<ScopeValue>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// Create an equality filter (`field = value`).
    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<ScopeValue>) -> Self {
        Self::new(field, FilterOperator::Eq, value)
    }

    /// Create a negated equality filter (`field != value`).
    #[must_use]
    pub fn neq(field: impl Into<String>, value: impl Into<ScopeValue>) -> Self {
        Self::new(field, FilterOperator::Neq, value)
    }

    /// Create a set membership filter (`field IN (values)`).
    #[must_use]
    pub fn r#in(field: impl Into<String>, values: Vec<ScopeValue>) -> Self {
        Self::new(field, FilterOperator::In, ScopeValue::List(values))
    }

    #[inline]
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    #[inline]
    #[must_use]
    pub fn operator(&self) -> FilterOperator {
        self.operator
    }

    #[inline]
    #[must_use]
    pub fn value(&self) -> &ScopeValue {
        &self.value
    }

    /// Stable textual identity of the `(field, operator, value)` triple.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}|{}|{}", self.field, self.operator, self.value)
    }
}

impl fmt::Display for ScopeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator, self.value)
    }
}

/// Remove filters with identical `(field, operator, value)` triples, keeping
/// the first occurrence of each.
#[must_use]
pub fn deduplicate(filters: Vec<ScopeFilter>) -> Vec<ScopeFilter> {
    let mut seen = HashSet::new();
    filters
        .into_iter()
        .filter(|f| seen.insert(f.key()))
        .collect()
}

/// Flags the one contradiction this model recognises: the same field carrying
/// both `eq v` and `neq v`. No general constraint solving is attempted.
#[must_use]
pub fn has_conflict(filters: &[ScopeFilter]) -> bool {
    filters
        .iter()
        .filter(|f| f.operator == FilterOperator::Eq)
        .any(|eq| {
            filters.iter().any(|other| {
                other.operator == FilterOperator::Neq
                    && other.field == eq.field
                    && other.value == eq.value
            })
        })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use serde_json::json;

    use super::*;

    const T1: &str = "11111111-1111-1111-1111-111111111111";

    #[test]
    fn eq_constructor() {
        let f = ScopeFilter::eq("tenant_id", "t1");
        assert_eq!(f.field(), "tenant_id");
        assert_eq!(f.operator(), FilterOperator::Eq);
        assert_eq!(f.value(), &ScopeValue::String("t1".to_owned()));
    }

    #[test]
    fn deduplicate_keeps_first_of_identical_triples() {
        let filters = vec![
            ScopeFilter::eq("tenant_id", "t1"),
            ScopeFilter::eq("owner_id", "u1"),
            ScopeFilter::eq("tenant_id", "t1"),
            ScopeFilter::neq("tenant_id", "t1"),
        ];
        let deduped = deduplicate(filters);
        assert_eq!(
            deduped,
            vec![
                ScopeFilter::eq("tenant_id", "t1"),
                ScopeFilter::eq("owner_id", "u1"),
                ScopeFilter::neq("tenant_id", "t1"),
            ]
        );
    }

    #[test]
    fn dedup_key_distinguishes_string_from_int() {
        let a = ScopeFilter::eq("level", "1");
        let b = ScopeFilter::eq("level", 1_i64);
        assert_ne!(a.key(), b.key());
        assert_eq!(deduplicate(vec![a, b]).len(), 2);
    }

    #[test]
    fn conflict_on_eq_and_neq_same_value() {
        let filters = vec![
            ScopeFilter::eq("department_id", "d1"),
            ScopeFilter::neq("department_id", "d1"),
        ];
        assert!(has_conflict(&filters));
    }

    #[test]
    fn no_conflict_for_different_values_or_fields() {
        let filters = vec![
            ScopeFilter::eq("department_id", "d1"),
            ScopeFilter::neq("department_id", "d2"),
            ScopeFilter::neq("team_id", "d1"),
        ];
        assert!(!has_conflict(&filters));
    }

    #[test]
    fn from_json_converts_supported_values() {
        assert_eq!(ScopeValue::from_json(&json!("x")), Some(ScopeValue::from("x")));
        assert_eq!(ScopeValue::from_json(&json!(7)), Some(ScopeValue::Int(7)));
        assert_eq!(
            ScopeValue::from_json(&json!(["a", "b"])),
            Some(ScopeValue::List(vec!["a".into(), "b".into()]))
        );
        assert_eq!(ScopeValue::from_json(&json!(null)), None);
        assert_eq!(ScopeValue::from_json(&json!(1.5)), None);
    }

    #[test]
    fn uuid_strings_are_recognised() {
        let value = ScopeValue::from(T1);
        assert_eq!(value.as_uuid(), Uuid::parse_str(T1).ok());
        assert_eq!(ScopeValue::Int(1).as_uuid(), None);
    }
}
