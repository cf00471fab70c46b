//! Role-based permission resolution.
//!
//! Expands a subject's bindings and each role's `inherits` edges into one
//! permission set. The role graph may contain cycles: traversal keeps a
//! visited set keyed by role id, so every role contributes at most once.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use authz_engine_sdk::permission::PermissionSet;
use authz_engine_sdk::{AuthzError, EffectivePermissions, RoleStore};
use authz_security::SubjectType;
use time::OffsetDateTime;
use tracing::debug;

/// Computes a subject's effective permissions on a cache miss.
#[async_trait]
pub trait PermissionLoader: Send + Sync {
    /// # Errors
    ///
    /// `StoreUnavailable` when the backing store fails.
    async fn load(
        &self,
        tenant_id: &str,
        subject_type: SubjectType,
        subject_id: &str,
    ) -> Result<EffectivePermissions, AuthzError>;
}

pub struct RoleResolver {
    store: Arc<dyn RoleStore>,
}

impl RoleResolver {
    #[must_use]
    pub fn new(store: Arc<dyn RoleStore>) -> Self {
        Self { store }
    }

    /// Walk active, unexpired bindings and union the permissions of every
    /// active role reachable through them.
    ///
    /// Missing roles and inactive or archived roles contribute nothing, and
    /// neither do the roles they inherit from.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` when the store fails.
    #[tracing::instrument(skip_all, fields(tenant_id = %tenant_id, subject_id = %subject_id))]
    pub async fn effective_permissions(
        &self,
        tenant_id: &str,
        subject_type: SubjectType,
        subject_id: &str,
    ) -> Result<EffectivePermissions, AuthzError> {
        let now = OffsetDateTime::now_utc();
        let bindings = self
            .store
            .list_bindings(tenant_id, subject_type, subject_id)
            .await?;

        let mut visited: HashSet<String> = HashSet::new();
        let mut result = EffectivePermissions::empty(tenant_id, subject_type, subject_id);

        for binding in &bindings {
            if binding.is_expired_at(now) {
                debug!(binding_id = %binding.id, role_id = %binding.role_id, "Skipping expired binding");
                continue;
            }
            self.collect(
                tenant_id,
                &binding.role_id,
                &mut visited,
                &mut result.roles,
                &mut result.permissions,
            )
            .await?;
        }

        result.computed_at = now;
        debug!(
            roles = result.roles.len(),
            permissions = result.permissions.len(),
            "Resolved effective permissions"
        );
        Ok(result)
    }

    async fn collect(
        &self,
        tenant_id: &str,
        root: &str,
        visited: &mut HashSet<String>,
        roles: &mut Vec<String>,
        permissions: &mut PermissionSet,
    ) -> Result<(), AuthzError> {
        let mut stack = vec![root.to_owned()];
        while let Some(role_id) = stack.pop() {
            if !visited.insert(role_id.clone()) {
                continue;
            }
            let Some(role) = self.store.get_role(tenant_id, &role_id).await? else {
                debug!(role_id = %role_id, "Bound or inherited role not found");
                continue;
            };
            if !role.is_active() {
                continue;
            }
            roles.push(role.name);
            permissions.extend(role.permissions);
            // Reversed so that the first declared parent is visited first.
            stack.extend(role.inherits.into_iter().rev());
        }
        Ok(())
    }

    /// `true` if giving `role_id` the parents `new_inherits` would make it
    /// reachable from itself, judged against the roles currently stored.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` when the store fails.
    pub async fn check_circular_inheritance(
        &self,
        tenant_id: &str,
        role_id: &str,
        new_inherits: &[String],
    ) -> Result<bool, AuthzError> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut stack: Vec<String> = new_inherits.to_vec();
        while let Some(current) = stack.pop() {
            if current == role_id {
                return Ok(true);
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(role) = self.store.get_role(tenant_id, &current).await? {
                stack.extend(role.inherits);
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl PermissionLoader for RoleResolver {
    async fn load(
        &self,
        tenant_id: &str,
        subject_type: SubjectType,
        subject_id: &str,
    ) -> Result<EffectivePermissions, AuthzError> {
        self.effective_permissions(tenant_id, subject_type, subject_id)
            .await
    }
}

/// Synchronous form of the cycle check for callers that already hold the
/// role graph (for example a store under its own lock).
#[must_use]
pub fn creates_cycle<F>(role_id: &str, new_inherits: &[String], mut inherits_of: F) -> bool
where
    F: FnMut(&str) -> Vec<String>,
{
    let mut visited: HashSet<String> = HashSet::new();
    let mut stack: Vec<String> = new_inherits.to_vec();
    while let Some(current) = stack.pop() {
        if current == role_id {
            return true;
        }
        if visited.insert(current.clone()) {
            stack.extend(inherits_of(&current));
        }
    }
    false
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::collections::HashMap;

    use authz_engine_sdk::{NewRole, NewRoleBinding, RolePatch, RoleStatus};

    use super::*;
    use crate::infra::storage::InMemoryRoleStore;

    async fn role(store: &InMemoryRoleStore, name: &str, perms: &[&str]) -> String {
        store
            .create_role(NewRole::new("t1", name).with_permissions(perms.iter().copied()))
            .await
            .unwrap()
            .id
    }

    async fn bind(store: &InMemoryRoleStore, role_id: &str) {
        store
            .bind(NewRoleBinding::new("t1", role_id, SubjectType::User, "u1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn inheritance_is_transitive() {
        let store = Arc::new(InMemoryRoleStore::new());
        let viewer = role(&store, "viewer", &["order:read"]).await;
        let editor = role(&store, "editor", &["order:update"]).await;
        let admin = role(&store, "admin", &["order:delete"]).await;
        store
            .update_role("t1", &editor, RolePatch { inherits: Some(vec![viewer]), ..Default::default() })
            .await
            .unwrap();
        store
            .update_role("t1", &admin, RolePatch { inherits: Some(vec![editor]), ..Default::default() })
            .await
            .unwrap();
        bind(&store, &admin).await;

        let resolver = RoleResolver::new(store);
        let eff = resolver
            .effective_permissions("t1", SubjectType::User, "u1")
            .await
            .unwrap();
        assert_eq!(eff.roles, vec!["admin", "editor", "viewer"]);
        assert_eq!(eff.permissions.len(), 3);
    }

    #[tokio::test]
    async fn expired_binding_contributes_nothing() {
        let store = Arc::new(InMemoryRoleStore::new());
        let r = role(&store, "temp", &["report:export"]).await;
        store
            .bind(
                NewRoleBinding::new("t1", &r, SubjectType::User, "u1")
                    .expires_at(OffsetDateTime::now_utc() - time::Duration::minutes(1)),
            )
            .await
            .unwrap();

        let eff = RoleResolver::new(store)
            .effective_permissions("t1", SubjectType::User, "u1")
            .await
            .unwrap();
        assert!(eff.permissions.is_empty());
        assert!(eff.roles.is_empty());
    }

    #[tokio::test]
    async fn inactive_roles_are_skipped() {
        let store = Arc::new(InMemoryRoleStore::new());
        let r = role(&store, "old", &["order:read"]).await;
        store
            .update_role(
                "t1",
                &r,
                RolePatch {
                    status: Some(RoleStatus::Archived),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        bind(&store, &r).await;

        let eff = RoleResolver::new(store)
            .effective_permissions("t1", SubjectType::User, "u1")
            .await
            .unwrap();
        assert!(eff.permissions.is_empty());
    }

    #[tokio::test]
    async fn other_tenants_bindings_are_invisible() {
        let store = Arc::new(InMemoryRoleStore::new());
        let r = role(&store, "manager", &["order:*"]).await;
        bind(&store, &r).await;

        let eff = RoleResolver::new(store)
            .effective_permissions("t2", SubjectType::User, "u1")
            .await
            .unwrap();
        assert!(eff.permissions.is_empty());
    }

    #[test]
    fn creates_cycle_detects_self_reachability() {
        let graph: HashMap<&str, Vec<String>> = HashMap::from([
            ("a", vec!["b".to_owned()]),
            ("b", vec!["c".to_owned()]),
            ("c", vec![]),
        ]);
        let lookup = |id: &str| graph.get(id).cloned().unwrap_or_default();

        assert!(creates_cycle("c", &["a".to_owned()], lookup));
        assert!(creates_cycle("a", &["a".to_owned()], lookup));
        assert!(!creates_cycle("a", &["c".to_owned()], lookup));
    }

    #[tokio::test]
    async fn async_cycle_check_reads_store() {
        let store = Arc::new(InMemoryRoleStore::new());
        let a = role(&store, "a", &[]).await;
        let b = role(&store, "b", &[]).await;
        store
            .update_role("t1", &b, RolePatch { inherits: Some(vec![a.clone()]), ..Default::default() })
            .await
            .unwrap();

        let resolver = RoleResolver::new(store);
        assert!(resolver.check_circular_inheritance("t1", &a, &[b.clone()]).await.unwrap());
        assert!(!resolver.check_circular_inheritance("t1", &b, &[a]).await.unwrap());
    }
}
