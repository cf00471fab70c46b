//! In-memory collaborators: role store, policy store, hierarchy resolver.
//!
//! Suitable for tests and single-process deployments. Data is partitioned by
//! tenant; no method reads another tenant's partition.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use authz_engine_sdk::permission;
use authz_engine_sdk::{
    AuthzError, HierarchyResolver, NewRole, NewRoleBinding, PolicyDefinition, PolicyStore,
    RoleBinding, RoleDefinition, RoleFilter, RolePatch, RoleStatus, RoleStore,
};
use authz_security::SubjectType;
use dashmap::DashMap;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::domain::hooks::{HookOutcome, LifecycleHooks, LifecycleStage};
use crate::domain::roles::creates_cycle;

#[derive(Default)]
struct TenantRoles {
    roles: HashMap<String, RoleDefinition>,
    /// Insertion order is the resolution order.
    bindings: Vec<RoleBinding>,
}

/// Role store keeping everything in a per-tenant map.
///
/// Optional [`LifecycleHooks`] run around create/update/delete. A `Halt` from
/// a before-stage rejects the operation with `PermissionDenied`. Before-hooks
/// may change status, permissions and inherits; `id`, `tenant_id`, `name` and
/// `type` always keep their pre-hook values, and the changed role is validated
/// again before it is stored. Hooks run while the tenant partition is locked
/// and must not call back into the store.
#[derive(Default)]
pub struct InMemoryRoleStore {
    tenants: DashMap<String, TenantRoles>,
    hooks: LifecycleHooks<RoleDefinition>,
}

impl InMemoryRoleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_hooks(hooks: LifecycleHooks<RoleDefinition>) -> Self {
        Self {
            tenants: DashMap::new(),
            hooks,
        }
    }

    fn before(
        &self,
        stage: LifecycleStage,
        operation: &str,
        role: RoleDefinition,
    ) -> Result<RoleDefinition, AuthzError> {
        let pinned = role.clone();
        match self.hooks.run(stage, role) {
            HookOutcome::Proceed(mut role) => {
                if role.id != pinned.id
                    || role.tenant_id != pinned.tenant_id
                    || role.name != pinned.name
                    || role.role_type != pinned.role_type
                {
                    warn!(role_id = %pinned.id, ?stage, "Hook changed immutable role fields, restoring");
                    role.id = pinned.id;
                    role.tenant_id = pinned.tenant_id;
                    role.name = pinned.name;
                    role.role_type = pinned.role_type;
                }
                Ok(role)
            }
            HookOutcome::Halt { reason } => Err(AuthzError::PermissionDenied {
                permission: permission::encode("role", operation),
                reason,
            }),
        }
    }

    fn after(&self, stage: LifecycleStage, role: RoleDefinition) -> RoleDefinition {
        let fallback = role.clone();
        match self.hooks.run(stage, role) {
            HookOutcome::Proceed(role) => role,
            HookOutcome::Halt { reason } => {
                warn!(role_id = %fallback.id, reason = %reason, "After-hook halted on a committed change");
                fallback
            }
        }
    }
}

fn validate_grants(permissions: &[String]) -> Result<(), AuthzError> {
    permission::validate_patterns(permissions.iter().map(String::as_str))
}

#[async_trait]
impl RoleStore for InMemoryRoleStore {
    async fn get_role(
        &self,
        tenant_id: &str,
        role_id: &str,
    ) -> Result<Option<RoleDefinition>, AuthzError> {
        Ok(self
            .tenants
            .get(tenant_id)
            .and_then(|t| t.roles.get(role_id).cloned()))
    }

    async fn list_roles(
        &self,
        tenant_id: &str,
        filter: &RoleFilter,
    ) -> Result<Vec<RoleDefinition>, AuthzError> {
        let mut roles: Vec<RoleDefinition> = self
            .tenants
            .get(tenant_id)
            .map(|t| {
                t.roles
                    .values()
                    .filter(|r| filter.matches(r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn create_role(&self, role: NewRole) -> Result<RoleDefinition, AuthzError> {
        validate_grants(&role.permissions)?;
        let now = OffsetDateTime::now_utc();
        let definition = RoleDefinition {
            id: Uuid::new_v4().to_string(),
            tenant_id: role.tenant_id,
            name: role.name,
            role_type: role.role_type,
            status: RoleStatus::Active,
            permissions: role.permissions,
            inherits: role.inherits,
            created_at: now,
            updated_at: now,
        };

        let mut tenant = self.tenants.entry(definition.tenant_id.clone()).or_default();
        if tenant.roles.values().any(|r| r.name == definition.name) {
            return Err(AuthzError::Conflict(format!(
                "role '{}' already exists in tenant '{}'",
                definition.name, definition.tenant_id
            )));
        }
        let definition = self.before(LifecycleStage::BeforeCreate, "create", definition)?;
        validate_grants(&definition.permissions)?;
        tenant
            .roles
            .insert(definition.id.clone(), definition.clone());
        drop(tenant);

        Ok(self.after(LifecycleStage::AfterCreate, definition))
    }

    async fn update_role(
        &self,
        tenant_id: &str,
        role_id: &str,
        patch: RolePatch,
    ) -> Result<RoleDefinition, AuthzError> {
        let mut tenant = self
            .tenants
            .get_mut(tenant_id)
            .ok_or_else(|| AuthzError::not_found("role", role_id))?;
        let Some(current) = tenant.roles.get(role_id).cloned() else {
            return Err(AuthzError::not_found("role", role_id));
        };

        let mut updated = current;
        if let Some(status) = patch.status {
            updated.status = status;
        }
        if let Some(permissions) = patch.permissions {
            updated.permissions = permissions;
        }
        if let Some(inherits) = patch.inherits {
            updated.inherits = inherits;
        }
        updated.updated_at = OffsetDateTime::now_utc();

        let updated = self.before(LifecycleStage::BeforeUpdate, "update", updated)?;
        validate_grants(&updated.permissions)?;
        let graph = &tenant.roles;
        let cyclic = creates_cycle(role_id, &updated.inherits, |id| {
            graph.get(id).map(|r| r.inherits.clone()).unwrap_or_default()
        });
        if cyclic {
            return Err(AuthzError::CircularInheritance {
                role_id: role_id.to_owned(),
            });
        }
        tenant.roles.insert(role_id.to_owned(), updated.clone());
        drop(tenant);

        Ok(self.after(LifecycleStage::AfterUpdate, updated))
    }

    async fn delete_role(&self, tenant_id: &str, role_id: &str) -> Result<(), AuthzError> {
        let mut tenant = self
            .tenants
            .get_mut(tenant_id)
            .ok_or_else(|| AuthzError::not_found("role", role_id))?;
        let Some(current) = tenant.roles.get(role_id).cloned() else {
            return Err(AuthzError::not_found("role", role_id));
        };
        let current = self.before(LifecycleStage::BeforeDelete, "delete", current)?;

        tenant.roles.remove(role_id);
        tenant.bindings.retain(|b| b.role_id != role_id);
        drop(tenant);

        self.after(LifecycleStage::AfterDelete, current);
        Ok(())
    }

    async fn bind(&self, binding: NewRoleBinding) -> Result<RoleBinding, AuthzError> {
        let mut tenant = self
            .tenants
            .get_mut(&binding.tenant_id)
            .ok_or_else(|| AuthzError::not_found("role", &binding.role_id))?;
        if !tenant.roles.contains_key(&binding.role_id) {
            return Err(AuthzError::not_found("role", binding.role_id));
        }
        let duplicate = tenant.bindings.iter().any(|b| {
            b.subject_type == binding.subject_type
                && b.subject_id == binding.subject_id
                && b.role_id == binding.role_id
        });
        if duplicate {
            return Err(AuthzError::Conflict(format!(
                "{} '{}' is already bound to role '{}'",
                binding.subject_type, binding.subject_id, binding.role_id
            )));
        }

        let created = RoleBinding {
            id: Uuid::new_v4().to_string(),
            tenant_id: binding.tenant_id,
            role_id: binding.role_id,
            subject_type: binding.subject_type,
            subject_id: binding.subject_id,
            expires_at: binding.expires_at,
            created_at: OffsetDateTime::now_utc(),
        };
        tenant.bindings.push(created.clone());
        Ok(created)
    }

    async fn unbind(&self, tenant_id: &str, binding_id: &str) -> Result<(), AuthzError> {
        let mut tenant = self
            .tenants
            .get_mut(tenant_id)
            .ok_or_else(|| AuthzError::not_found("binding", binding_id))?;
        let before = tenant.bindings.len();
        tenant.bindings.retain(|b| b.id != binding_id);
        if tenant.bindings.len() == before {
            return Err(AuthzError::not_found("binding", binding_id));
        }
        Ok(())
    }

    async fn list_bindings(
        &self,
        tenant_id: &str,
        subject_type: SubjectType,
        subject_id: &str,
    ) -> Result<Vec<RoleBinding>, AuthzError> {
        Ok(self
            .tenants
            .get(tenant_id)
            .map(|t| {
                t.bindings
                    .iter()
                    .filter(|b| b.subject_type == subject_type && b.subject_id == subject_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Policy definitions held per tenant.
#[derive(Default)]
pub struct InMemoryPolicyStore {
    policies: DashMap<String, Vec<PolicyDefinition>>,
}

impl InMemoryPolicyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the tenant's definitions.
    pub fn put(&self, tenant_id: &str, policies: Vec<PolicyDefinition>) {
        self.policies.insert(tenant_id.to_owned(), policies);
    }

    pub fn add(&self, tenant_id: &str, policy: PolicyDefinition) {
        self.policies
            .entry(tenant_id.to_owned())
            .or_default()
            .push(policy);
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn list_policies(&self, tenant_id: &str) -> Result<Vec<PolicyDefinition>, AuthzError> {
        Ok(self
            .policies
            .get(tenant_id)
            .map(|p| p.value().clone())
            .unwrap_or_default())
    }
}

/// Fixed parent/child hierarchy.
#[derive(Debug, Default, Clone)]
pub struct StaticHierarchyResolver {
    children: HashMap<String, Vec<String>>,
}

impl StaticHierarchyResolver {
    /// Build from `(parent, child)` edges. Children keep edge order.
    #[must_use]
    pub fn new<P, C>(edges: impl IntoIterator<Item = (P, C)>) -> Self
    where
        P: Into<String>,
        C: Into<String>,
    {
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for (parent, child) in edges {
            children.entry(parent.into()).or_default().push(child.into());
        }
        Self { children }
    }

    /// Pre-order: each node before its subtree. Revisited nodes are skipped.
    #[must_use]
    pub fn descendants_of(&self, root: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = vec![root];
        while let Some(node) = stack.pop() {
            if !seen.insert(node) {
                continue;
            }
            out.push(node.to_owned());
            if let Some(kids) = self.children.get(node) {
                stack.extend(kids.iter().rev().map(String::as_str));
            }
        }
        out
    }
}

#[async_trait]
impl HierarchyResolver for StaticHierarchyResolver {
    async fn resolve_root(&self, root_id: &str) -> Result<Vec<String>, AuthzError> {
        Ok(self.descendants_of(root_id))
    }
}
