//! Collaborator traits consumed by the engine.
//!
//! Implementations live outside the engine (persistence adapters, directory
//! services, attribute sources). The engine crate ships in-memory versions for
//! tests and single-process deployments.

use async_trait::async_trait;
use authz_security::{RequestContext, ScopeValue, SubjectType};

use crate::error::AuthzError;
use crate::models::{
    CheckContext, NewRole, NewRoleBinding, RoleBinding, RoleDefinition, RoleFilter, RolePatch,
};
use crate::policy::PolicyDefinition;

/// Tenant-scoped role and binding storage.
///
/// Every call is confined to `tenant_id`; no method may read or mutate another
/// tenant's data. Implementations must enforce:
///
/// - role names are unique per tenant (`Conflict`)
/// - `name` and `type` never change after creation
/// - deleting a role deletes its bindings
/// - bindings are unique on `(tenant, subject_type, subject_id, role_id)` (`Conflict`)
/// - an update that would make a role reachable from itself fails with
///   `CircularInheritance`
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// # Errors
    ///
    /// `StoreUnavailable` on I/O failure.
    async fn get_role(
        &self,
        tenant_id: &str,
        role_id: &str,
    ) -> Result<Option<RoleDefinition>, AuthzError>;

    /// # Errors
    ///
    /// `StoreUnavailable` on I/O failure.
    async fn list_roles(
        &self,
        tenant_id: &str,
        filter: &RoleFilter,
    ) -> Result<Vec<RoleDefinition>, AuthzError>;

    /// # Errors
    ///
    /// - `Conflict` if the name is taken in the tenant
    /// - `InvalidPermissionCode` for malformed grants
    async fn create_role(&self, role: NewRole) -> Result<RoleDefinition, AuthzError>;

    /// # Errors
    ///
    /// - `NotFound` for an unknown role
    /// - `CircularInheritance` if the new `inherits` closes a cycle
    /// - `InvalidPermissionCode` for malformed grants
    async fn update_role(
        &self,
        tenant_id: &str,
        role_id: &str,
        patch: RolePatch,
    ) -> Result<RoleDefinition, AuthzError>;

    /// Deletes the role and every binding referencing it.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown role.
    async fn delete_role(&self, tenant_id: &str, role_id: &str) -> Result<(), AuthzError>;

    /// # Errors
    ///
    /// - `NotFound` if the role does not exist in the tenant
    /// - `Conflict` for a duplicate binding
    async fn bind(&self, binding: NewRoleBinding) -> Result<RoleBinding, AuthzError>;

    /// # Errors
    ///
    /// `NotFound` for an unknown binding.
    async fn unbind(&self, tenant_id: &str, binding_id: &str) -> Result<(), AuthzError>;

    /// All bindings of one subject, expired ones included.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` on I/O failure.
    async fn list_bindings(
        &self,
        tenant_id: &str,
        subject_type: SubjectType,
        subject_id: &str,
    ) -> Result<Vec<RoleBinding>, AuthzError>;
}

/// Source of per-tenant policy definitions. Compilation is the engine's job.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// # Errors
    ///
    /// `StoreUnavailable` on I/O failure.
    async fn list_policies(&self, tenant_id: &str) -> Result<Vec<PolicyDefinition>, AuthzError>;
}

/// Expands a hierarchy root into itself plus all descendants.
#[async_trait]
pub trait HierarchyResolver: Send + Sync {
    /// Returns `[root, ...descendants]`.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` on I/O failure.
    async fn resolve_root(&self, root_id: &str) -> Result<Vec<String>, AuthzError>;
}

/// Runtime attribute lookup (clock, subject or resource attributes).
#[async_trait]
pub trait AttributeProvider: Send + Sync {
    /// `Ok(None)` means the attribute is not known for this check.
    ///
    /// # Errors
    ///
    /// `AttributeUnavailable` when the lookup itself fails.
    async fn attribute(
        &self,
        ctx: &CheckContext,
        name: &str,
    ) -> Result<Option<serde_json::Value>, AuthzError>;
}

/// Predicate behind a policy [`Condition`](crate::policy::Condition).
#[async_trait]
pub trait ConditionEvaluator: Send + Sync {
    /// # Errors
    ///
    /// Any error is logged by the evaluator and treated as `false`.
    async fn evaluate(&self, ctx: &CheckContext) -> Result<bool, AuthzError>;
}

/// Computes a scope condition value from the request.
#[async_trait]
pub trait ScopeValueResolver: Send + Sync {
    /// # Errors
    ///
    /// Surfaced as `ScopeResolution` for the owning scope.
    async fn resolve(&self, ctx: &RequestContext) -> Result<ScopeValue, AuthzError>;
}
