//! Validates policy definitions and fixes their evaluation order.

use std::cmp::Reverse;

use authz_engine_sdk::permission::{self, PermissionSet};
use authz_engine_sdk::{AuthzError, Condition, Effect, PolicyDefinition, Priority};

/// Immutable, priority-ordered form of one rule.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// Position in the source definition.
    pub index: usize,
    pub permissions: PermissionSet,
    pub effect: Effect,
    pub conditions: Vec<Condition>,
    pub priority: Priority,
    pub description: Option<String>,
}

/// Immutable, priority-ordered form of a [`PolicyDefinition`].
///
/// Any change to the definition requires recompiling.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    id: String,
    priority: Priority,
    rules: Vec<CompiledRule>,
}

impl CompiledPolicy {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Rules in evaluation order: descending score, declaration order on ties.
    #[must_use]
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }
}

/// Compile one definition.
///
/// # Errors
///
/// `PolicyCompilation` for an empty id, an empty rule list, or a rule with no
/// permissions, an unknown effect or a malformed pattern (naming the rule
/// index).
pub fn compile(definition: &PolicyDefinition) -> Result<CompiledPolicy, AuthzError> {
    compile_inner(definition).inspect_err(|e| {
        tracing::error!(policy_id = %definition.id, error = %e, "Policy compilation failed");
    })
}

fn compile_inner(definition: &PolicyDefinition) -> Result<CompiledPolicy, AuthzError> {
    let id = definition.id.trim();
    if id.is_empty() {
        return Err(AuthzError::compilation("", None, "id must not be empty"));
    }
    if definition.rules.is_empty() {
        return Err(AuthzError::compilation(id, None, "rules must not be empty"));
    }

    let mut rules = Vec::with_capacity(definition.rules.len());
    for (index, rule) in definition.rules.iter().enumerate() {
        if rule.permissions.is_empty() {
            return Err(AuthzError::compilation(
                id,
                Some(index),
                "permissions must not be empty",
            ));
        }
        let Some(effect) = Effect::parse(&rule.effect) else {
            return Err(AuthzError::compilation(
                id,
                Some(index),
                format!("effect must be 'allow' or 'deny', got '{}'", rule.effect),
            ));
        };
        permission::validate_patterns(rule.permissions.iter().map(String::as_str))
            .map_err(|e| AuthzError::compilation(id, Some(index), e.to_string()))?;

        rules.push(CompiledRule {
            index,
            permissions: rule.permissions.iter().cloned().collect(),
            effect,
            conditions: rule.conditions.clone(),
            priority: Priority::from_label(rule.priority.as_deref()),
            description: rule.description.clone(),
        });
    }

    // Stable: equal scores keep declaration order.
    rules.sort_by_key(|r| Reverse(r.priority.score()));

    Ok(CompiledPolicy {
        id: id.to_owned(),
        priority: Priority::from_label(definition.priority.as_deref()),
        rules,
    })
}

/// Compile a tenant's definitions and order the policies themselves by
/// descending priority (declaration order on ties).
///
/// # Errors
///
/// The first definition's `PolicyCompilation` error.
pub fn compile_all(definitions: &[PolicyDefinition]) -> Result<Vec<CompiledPolicy>, AuthzError> {
    let mut compiled = definitions
        .iter()
        .map(compile)
        .collect::<Result<Vec<_>, _>>()?;
    compiled.sort_by_key(|p| Reverse(p.priority.score()));
    Ok(compiled)
}
