//! Public API trait for the authz engine.

use async_trait::async_trait;
use authz_security::RequestContext;

use crate::error::AuthzError;
use crate::models::{BatchCheckResult, CacheStats, CheckContext, CheckResult};
use crate::permission;
use crate::scope::{CombineMode, CombinedScope, ScopeDefinition};

/// Public API trait for the authz engine.
///
/// Consumed by web/API layers acting as enforcement points:
///
/// ```ignore
/// let authz: Arc<dyn AuthzEngineClient> = module.client();
///
/// let ctx = CheckContext::new(request, "order", "confirm");
/// if !authz.check(ctx).await?.allowed {
///     return Err(Forbidden);
/// }
/// ```
#[async_trait]
pub trait AuthzEngineClient: Send + Sync {
    /// Decide one permission. A deny is `Ok` with `allowed == false`.
    ///
    /// # Errors
    ///
    /// - `InvalidPermissionCode` if resource/action do not form a concrete code
    /// - `PolicyCompilation` if a tenant policy is malformed
    /// - `StoreUnavailable` on collaborator failure
    async fn check(&self, ctx: CheckContext) -> Result<CheckResult, AuthzError>;

    /// Repeated [`check`](Self::check), keyed by permission code.
    ///
    /// # Errors
    ///
    /// The first error any single check raises.
    async fn check_many(&self, contexts: Vec<CheckContext>) -> Result<BatchCheckResult, AuthzError>;

    /// Like [`check`](Self::check), but a deny becomes `PermissionDenied`.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` carrying the code and reason, or any `check` error.
    async fn check_or_throw(&self, ctx: CheckContext) -> Result<CheckResult, AuthzError> {
        let result = self.check(ctx).await?;
        if result.allowed {
            Ok(result)
        } else {
            Err(AuthzError::PermissionDenied {
                permission: result.permission,
                reason: result.reason.to_string(),
            })
        }
    }

    /// `true` if at least one of `codes` is allowed.
    ///
    /// # Errors
    ///
    /// `InvalidPermissionCode` for a malformed code, or any `check` error.
    async fn has_any(&self, request: &RequestContext, codes: &[&str]) -> Result<bool, AuthzError> {
        Ok(self.check_many(contexts_for(request, codes)?).await?.any_allowed)
    }

    /// `true` if every one of `codes` is allowed.
    ///
    /// # Errors
    ///
    /// `InvalidPermissionCode` for a malformed code, or any `check` error.
    async fn has_all(&self, request: &RequestContext, codes: &[&str]) -> Result<bool, AuthzError> {
        Ok(self.check_many(contexts_for(request, codes)?).await?.all_allowed)
    }

    /// Resolve, combine and deduplicate row-level filters for `request`.
    ///
    /// # Errors
    ///
    /// `ScopeResolution` when a declared condition cannot be resolved.
    async fn resolve_scopes(
        &self,
        definitions: &[ScopeDefinition],
        request: &RequestContext,
        mode: Option<CombineMode>,
    ) -> Result<CombinedScope, AuthzError>;

    /// Drop the cached permission sets of `subject_id`, whatever its subject
    /// type.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` on collaborator failure.
    async fn invalidate_subject(&self, tenant_id: &str, subject_id: &str) -> Result<(), AuthzError>;

    /// Drop every cached entry of `tenant_id`; returns how many were removed.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` on collaborator failure.
    async fn invalidate_tenant(&self, tenant_id: &str) -> Result<usize, AuthzError>;

    /// Forget compiled policies of `tenant_id`; the next check recompiles.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` on collaborator failure.
    async fn invalidate_policies(&self, tenant_id: &str) -> Result<(), AuthzError>;

    /// # Errors
    ///
    /// `StoreUnavailable` on collaborator failure.
    async fn clear_cache(&self) -> Result<(), AuthzError>;

    /// # Errors
    ///
    /// `StoreUnavailable` on collaborator failure.
    async fn cache_stats(&self) -> Result<CacheStats, AuthzError>;
}

fn contexts_for(request: &RequestContext, codes: &[&str]) -> Result<Vec<CheckContext>, AuthzError> {
    codes
        .iter()
        .map(|code| {
            let p = permission::parse_code(code)?;
            Ok(CheckContext::new(request.clone(), p.resource, p.action))
        })
        .collect()
}
