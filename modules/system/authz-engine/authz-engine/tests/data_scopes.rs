#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Row-level filters produced by the module client.

use std::sync::Arc;

use authz_engine::AuthzEngineConfig;
use authz_engine::AuthzEngineModule;
use authz_engine::infra::storage::{InMemoryRoleStore, StaticHierarchyResolver};
use authz_engine_sdk::{
    AuthzEngineClient, AuthzError, CombineMode, ContextRef, ScopeDefinition,
};
use authz_security::{RequestContext, ScopeFilter, ScopeValue, Subject};
use serde_json::json;

fn client(with_hierarchy: bool) -> Arc<dyn AuthzEngineClient> {
    let mut builder = AuthzEngineModule::builder(AuthzEngineConfig::default())
        .role_store(Arc::new(InMemoryRoleStore::new()));
    if with_hierarchy {
        builder = builder.hierarchy_resolver(Arc::new(StaticHierarchyResolver::new([
            ("u1", "u2"),
            ("u1", "u3"),
            ("u2", "u4"),
        ])));
    }
    builder.build().unwrap().client()
}

fn request() -> RequestContext {
    RequestContext::builder()
        .tenant_id("t1")
        .subject(Subject::user("u1").with_metadata("department_id", json!("sales")))
        .build()
}

#[tokio::test]
async fn combinable_scopes_are_flattened_and_deduplicated() {
    let scopes = [
        ScopeDefinition::tenant("tenant"),
        ScopeDefinition::department("dept", "department_id", "department_id"),
        ScopeDefinition::tenant("tenant_again"),
    ];
    let combined = client(false)
        .resolve_scopes(&scopes, &request(), None)
        .await
        .unwrap();

    assert_eq!(combined.mode, CombineMode::And);
    assert_eq!(
        combined.filters,
        vec![
            ScopeFilter::eq("tenant_id", "t1"),
            ScopeFilter::eq("department_id", "sales"),
        ]
    );
}

#[tokio::test]
async fn an_exclusive_scope_replaces_all_others() {
    let scopes = [
        ScopeDefinition::tenant("tenant").with_priority(100),
        ScopeDefinition::department("dept", "department_id", "department_id"),
        ScopeDefinition::owned_by_self("mine", "owner_id").exclusive(),
    ];
    let combined = client(false)
        .resolve_scopes(&scopes, &request(), Some(CombineMode::Or))
        .await
        .unwrap();

    assert_eq!(combined.filters, vec![ScopeFilter::eq("owner_id", "u1")]);
}

#[tokio::test]
async fn subordinates_expand_through_the_hierarchy() {
    let scopes = [ScopeDefinition::subordinates(
        "reports",
        "manager_id",
        ContextRef::SubjectId,
    )];
    let combined = client(true)
        .resolve_scopes(&scopes, &request(), None)
        .await
        .unwrap();

    let expected: Vec<ScopeValue> = ["u1", "u2", "u4", "u3"]
        .into_iter()
        .map(ScopeValue::from)
        .collect();
    assert_eq!(combined.filters, vec![ScopeFilter::r#in("manager_id", expected)]);

    let err = client(false)
        .resolve_scopes(&scopes, &request(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthzError::ScopeResolution { .. }));
}

#[tokio::test]
async fn all_scope_is_unrestricted() {
    let combined = client(false)
        .resolve_scopes(&[ScopeDefinition::all("everything")], &request(), None)
        .await
        .unwrap();
    assert!(combined.is_unrestricted());
}
