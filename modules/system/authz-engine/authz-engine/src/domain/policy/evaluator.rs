//! First-match-wins evaluation of compiled policies.

use authz_engine_sdk::permission;
use authz_engine_sdk::{CheckContext, Effect};
use tracing::warn;

use super::compiler::{CompiledPolicy, CompiledRule};

/// Outcome of a policy scan. `matched_policy` is `None` for the default deny.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDecision {
    pub effect: Effect,
    pub matched_policy: Option<String>,
    pub matched_rule_index: Option<usize>,
}

impl PolicyDecision {
    fn default_deny() -> Self {
        Self {
            effect: Effect::Deny,
            matched_policy: None,
            matched_rule_index: None,
        }
    }

    #[must_use]
    pub fn is_match(&self) -> bool {
        self.matched_policy.is_some()
    }
}

/// Conditions are ANDed in declaration order and the first `false` stops the
/// scan. A failing evaluator counts as `false` and is logged.
pub async fn evaluate_rule(rule: &CompiledRule, ctx: &CheckContext) -> bool {
    for condition in &rule.conditions {
        match condition.evaluator().evaluate(ctx).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                warn!(
                    condition = condition.name(),
                    rule_index = rule.index,
                    error = %e,
                    "Policy condition failed, treating as false"
                );
                return false;
            }
        }
    }
    true
}

/// Scan `policies` (already ordered) and their rules (already ordered); the
/// first rule whose permissions cover `code` and whose conditions pass decides.
/// No match is a deny.
pub async fn evaluate(
    code: &str,
    ctx: &CheckContext,
    policies: &[CompiledPolicy],
) -> PolicyDecision {
    for policy in policies {
        for rule in policy.rules() {
            if !permission::matches_any(code, &rule.permissions) {
                continue;
            }
            if evaluate_rule(rule, ctx).await {
                return PolicyDecision {
                    effect: rule.effect,
                    matched_policy: Some(policy.id().to_owned()),
                    matched_rule_index: Some(rule.index),
                };
            }
        }
    }
    PolicyDecision::default_deny()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use authz_engine_sdk::conditions::{attribute_equals, from_fn};
    use authz_engine_sdk::{AuthzError, PolicyDefinition, PolicyRule};
    use authz_security::{RequestContext, Subject};
    use serde_json::json;
    use tracing_test::traced_test;

    use super::*;
    use crate::domain::policy::compile;

    fn ctx(resource: &str, action: &str) -> CheckContext {
        let request = RequestContext::builder()
            .tenant_id("t1")
            .subject(Subject::user("u1"))
            .attribute("region", json!("eu"))
            .build();
        CheckContext::new(request, resource, action)
    }

    fn critical_deny_low_allow() -> Vec<CompiledPolicy> {
        let def = PolicyDefinition::new("orders")
            .with_rule(PolicyRule::deny(["order:delete"]).with_priority("critical"))
            .with_rule(PolicyRule::allow(["order:*"]).with_priority("low"));
        vec![compile(&def).unwrap()]
    }

    #[tokio::test]
    async fn first_match_wins() {
        let policies = critical_deny_low_allow();

        let d = evaluate("order:delete", &ctx("order", "delete"), &policies).await;
        assert_eq!(d.effect, Effect::Deny);
        assert_eq!(d.matched_rule_index, Some(0));

        let d = evaluate("order:confirm", &ctx("order", "confirm"), &policies).await;
        assert_eq!(d.effect, Effect::Allow);
        assert_eq!(d.matched_rule_index, Some(1));
    }

    #[tokio::test]
    async fn no_match_is_default_deny() {
        let d = evaluate("product:read", &ctx("product", "read"), &critical_deny_low_allow()).await;
        assert_eq!(d.effect, Effect::Deny);
        assert!(!d.is_match());
    }

    #[tokio::test]
    async fn failed_conditions_fall_through_to_next_rule() {
        let def = PolicyDefinition::new("regional")
            .with_rule(
                PolicyRule::deny(["order:read"])
                    .with_priority("high")
                    .with_condition(attribute_equals("region", json!("us"))),
            )
            .with_rule(PolicyRule::allow(["order:read"]));
        let policies = vec![compile(&def).unwrap()];

        let d = evaluate("order:read", &ctx("order", "read"), &policies).await;
        assert_eq!(d.effect, Effect::Allow);
    }

    #[tokio::test]
    async fn conditions_short_circuit_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let def = PolicyDefinition::new("p").with_rule(
            PolicyRule::allow(["order:read"])
                .with_condition(from_fn("never", |_| Ok(false)))
                .with_condition(from_fn("counted", move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(true)
                })),
        );
        let policies = vec![compile(&def).unwrap()];

        let d = evaluate("order:read", &ctx("order", "read"), &policies).await;
        assert!(!d.is_match());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn evaluator_error_is_logged_and_treated_as_false() {
        let def = PolicyDefinition::new("p").with_rule(
            PolicyRule::allow(["order:read"]).with_condition(from_fn("broken_provider", |_| {
                Err(AuthzError::AttributeUnavailable("clock".to_owned()))
            })),
        );
        let policies = vec![compile(&def).unwrap()];

        let d = evaluate("order:read", &ctx("order", "read"), &policies).await;
        assert_eq!(d.effect, Effect::Deny);
        assert!(!d.is_match());
        assert!(logs_contain("Policy condition failed"));
        assert!(logs_contain("broken_provider"));
    }
}
