//! Declarative policy definitions.
//!
//! A [`PolicyDefinition`] is what a policy store hands over. The engine
//! compiles it into an immutable, priority-ordered form before evaluation.

use std::fmt;
use std::sync::Arc;

use crate::ports::ConditionEvaluator;

/// A named, async-capable predicate attached to a policy rule.
#[derive(Clone)]
pub struct Condition {
    name: String,
    evaluator: Arc<dyn ConditionEvaluator>,
}

impl Condition {
    #[must_use]
    pub fn new(name: impl Into<String>, evaluator: Arc<dyn ConditionEvaluator>) -> Self {
        Self {
            name: name.into(),
            evaluator,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn evaluator(&self) -> &Arc<dyn ConditionEvaluator> {
        &self.evaluator
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// One allow/deny rule.
///
/// `effect` and `priority` stay as raw labels so that the compiler can report
/// bad input with the rule index instead of failing at deserialization time.
#[derive(Debug, Clone, Default)]
pub struct PolicyRule {
    /// Codes or patterns this rule applies to. Must not be empty.
    pub permissions: Vec<String>,
    /// `"allow"` or `"deny"`.
    pub effect: String,
    /// ANDed, evaluated in order.
    pub conditions: Vec<Condition>,
    /// `low`, `normal`, `high` or `critical`; anything else counts as `normal`.
    pub priority: Option<String>,
    pub description: Option<String>,
}

impl PolicyRule {
    fn with_effect<S: Into<String>>(effect: &str, permissions: impl IntoIterator<Item = S>) -> Self {
        Self {
            permissions: permissions.into_iter().map(Into::into).collect(),
            effect: effect.to_owned(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn allow<S: Into<String>>(permissions: impl IntoIterator<Item = S>) -> Self {
        Self::with_effect("allow", permissions)
    }

    #[must_use]
    pub fn deny<S: Into<String>>(permissions: impl IntoIterator<Item = S>) -> Self {
        Self::with_effect("deny", permissions)
    }

    #[must_use]
    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct PolicyDefinition {
    pub id: String,
    pub name: Option<String>,
    /// Orders whole policies against each other; same labels as rules.
    pub priority: Option<String>,
    pub rules: Vec<PolicyRule>,
}

impl PolicyDefinition {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    #[must_use]
    pub fn with_rule(mut self, rule: PolicyRule) -> Self {
        self.rules.push(rule);
        self
    }
}
