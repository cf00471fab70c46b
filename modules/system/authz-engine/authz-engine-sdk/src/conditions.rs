//! Built-in policy conditions.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AuthzError;
use crate::models::CheckContext;
use crate::policy::Condition;
use crate::ports::{AttributeProvider, ConditionEvaluator};

struct FnEvaluator<F>(F);

#[async_trait]
impl<F> ConditionEvaluator for FnEvaluator<F>
where
    F: Fn(&CheckContext) -> Result<bool, AuthzError> + Send + Sync,
{
    async fn evaluate(&self, ctx: &CheckContext) -> Result<bool, AuthzError> {
        (self.0)(ctx)
    }
}

/// Wraps a synchronous closure.
pub fn from_fn<F>(name: impl Into<String>, f: F) -> Condition
where
    F: Fn(&CheckContext) -> Result<bool, AuthzError> + Send + Sync + 'static,
{
    Condition::new(name, Arc::new(FnEvaluator(f)))
}

/// Request attribute `name` equals `expected`. A missing attribute is `false`.
#[must_use]
pub fn attribute_equals(name: impl Into<String>, expected: serde_json::Value) -> Condition {
    let name = name.into();
    let label = format!("attribute_equals({name})");
    from_fn(label, move |ctx| {
        Ok(ctx.request.attribute(&name) == Some(&expected))
    })
}

/// Subject metadata `key` equals `expected`.
#[must_use]
pub fn subject_metadata_equals(key: impl Into<String>, expected: serde_json::Value) -> Condition {
    let key = key.into();
    let label = format!("subject_metadata_equals({key})");
    from_fn(label, move |ctx| {
        Ok(ctx.request.subject().metadata.get(&key) == Some(&expected))
    })
}

/// The identity layer asserted `role` on the subject.
#[must_use]
pub fn subject_has_role(role: impl Into<String>) -> Condition {
    let role = role.into();
    let label = format!("subject_has_role({role})");
    from_fn(label, move |ctx| {
        Ok(ctx.request.subject().roles.iter().any(|r| *r == role))
    })
}

/// The check targets a specific resource instance.
#[must_use]
pub fn resource_id_present() -> Condition {
    from_fn("resource_id_present", |ctx| Ok(ctx.resource_id.is_some()))
}

struct ProvidedAttributeEquals {
    provider: Arc<dyn AttributeProvider>,
    name: String,
    expected: serde_json::Value,
}

#[async_trait]
impl ConditionEvaluator for ProvidedAttributeEquals {
    async fn evaluate(&self, ctx: &CheckContext) -> Result<bool, AuthzError> {
        let value = self.provider.attribute(ctx, &self.name).await?;
        Ok(value.as_ref() == Some(&self.expected))
    }
}

/// Asks `provider` for attribute `name` and compares it with `expected`.
/// Provider failures propagate and make the condition fail.
#[must_use]
pub fn provided_attribute_equals(
    provider: Arc<dyn AttributeProvider>,
    name: impl Into<String>,
    expected: serde_json::Value,
) -> Condition {
    let name = name.into();
    Condition::new(
        format!("provided_attribute_equals({name})"),
        Arc::new(ProvidedAttributeEquals {
            provider,
            name,
            expected,
        }),
    )
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use authz_security::{RequestContext, Subject};
    use serde_json::json;

    use super::*;

    fn ctx() -> CheckContext {
        let request = RequestContext::builder()
            .tenant_id("t1")
            .subject(
                Subject::user("u1")
                    .with_roles(vec!["auditor".to_owned()])
                    .with_metadata("department_id", json!("d1")),
            )
            .attribute("region", json!("eu"))
            .build();
        CheckContext::new(request, "order", "read")
    }

    struct Clock(Result<Option<serde_json::Value>, AuthzError>);

    #[async_trait]
    impl AttributeProvider for Clock {
        async fn attribute(
            &self,
            _ctx: &CheckContext,
            _name: &str,
        ) -> Result<Option<serde_json::Value>, AuthzError> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn request_and_subject_conditions() {
        let ctx = ctx();
        assert!(attribute_equals("region", json!("eu")).evaluator().evaluate(&ctx).await.unwrap());
        assert!(!attribute_equals("region", json!("us")).evaluator().evaluate(&ctx).await.unwrap());
        assert!(!attribute_equals("zone", json!("eu")).evaluator().evaluate(&ctx).await.unwrap());
        assert!(
            subject_metadata_equals("department_id", json!("d1"))
                .evaluator()
                .evaluate(&ctx)
                .await
                .unwrap()
        );
        assert!(subject_has_role("auditor").evaluator().evaluate(&ctx).await.unwrap());
        assert!(!resource_id_present().evaluator().evaluate(&ctx).await.unwrap());
        let with_id = ctx.with_resource_id("o-1");
        assert!(resource_id_present().evaluator().evaluate(&with_id).await.unwrap());
    }

    #[tokio::test]
    async fn provided_attribute_propagates_provider_failure() {
        let ok = provided_attribute_equals(
            Arc::new(Clock(Ok(Some(json!("business_hours"))))),
            "time_window",
            json!("business_hours"),
        );
        assert!(ok.evaluator().evaluate(&ctx()).await.unwrap());

        let failing = provided_attribute_equals(
            Arc::new(Clock(Err(AuthzError::AttributeUnavailable("clock".to_owned())))),
            "time_window",
            json!("business_hours"),
        );
        assert!(failing.evaluator().evaluate(&ctx()).await.is_err());
        assert_eq!(failing.name(), "provided_attribute_equals(time_window)");
    }
}
