//! Local (in-process) client for the authz engine.

use std::sync::Arc;

use async_trait::async_trait;
use authz_engine_sdk::{
    AuthzEngineClient, AuthzError, BatchCheckResult, CacheStats, CheckContext, CheckResult,
    CombineMode, CombinedScope, ScopeDefinition,
};
use authz_security::RequestContext;

use super::{DomainError, Service};

/// Local client wrapping the service.
pub struct AuthzEngineLocalClient {
    svc: Arc<Service>,
}

impl AuthzEngineLocalClient {
    #[must_use]
    pub fn new(svc: Arc<Service>) -> Self {
        Self { svc }
    }
}

fn log_and_convert(op: &str, e: DomainError) -> AuthzError {
    tracing::error!(operation = op, error = ?e, "authz_engine call failed");
    e.into()
}

#[async_trait]
impl AuthzEngineClient for AuthzEngineLocalClient {
    async fn check(&self, ctx: CheckContext) -> Result<CheckResult, AuthzError> {
        self.svc
            .check(&ctx)
            .await
            .map_err(|e| log_and_convert("check", e))
    }

    async fn check_many(&self, contexts: Vec<CheckContext>) -> Result<BatchCheckResult, AuthzError> {
        self.svc
            .check_many(&contexts)
            .await
            .map_err(|e| log_and_convert("check_many", e))
    }

    async fn resolve_scopes(
        &self,
        definitions: &[ScopeDefinition],
        request: &RequestContext,
        mode: Option<CombineMode>,
    ) -> Result<CombinedScope, AuthzError> {
        self.svc
            .resolve_scopes(definitions, request, mode)
            .await
            .map_err(|e| log_and_convert("resolve_scopes", e))
    }

    async fn invalidate_subject(&self, tenant_id: &str, subject_id: &str) -> Result<(), AuthzError> {
        self.svc.invalidate_subject(tenant_id, subject_id);
        Ok(())
    }

    async fn invalidate_tenant(&self, tenant_id: &str) -> Result<usize, AuthzError> {
        Ok(self.svc.invalidate_tenant(tenant_id))
    }

    async fn invalidate_policies(&self, tenant_id: &str) -> Result<(), AuthzError> {
        self.svc.invalidate_policies(tenant_id);
        Ok(())
    }

    async fn clear_cache(&self) -> Result<(), AuthzError> {
        self.svc.clear_cache();
        Ok(())
    }

    async fn cache_stats(&self) -> Result<CacheStats, AuthzError> {
        Ok(self.svc.cache_stats())
    }
}
