//! Domain service for the authz engine.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use authz_engine_sdk::permission;
use authz_engine_sdk::{
    BatchCheckResult, CacheStats, CheckContext, CheckResult, CombineMode, CombinedScope,
    DecisionReason, PolicyStore, RoleStore, ScopeDefinition,
};
use authz_security::RequestContext;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use super::cache::PermissionCache;
use super::error::DomainError;
use super::policy::{CompiledPolicy, compile_all, evaluate};
use super::roles::RoleResolver;
use super::scope::DataScopeResolver;

/// Wildcard entry of a subject's direct permission list.
const DIRECT_WILDCARD: &str = "*";

/// Compiled policies of one tenant. `generation` grows with every
/// invalidation; a load only publishes its result if the generation it
/// started from is still current.
#[derive(Default)]
struct PolicySlot {
    generation: u64,
    policies: Option<Arc<[CompiledPolicy]>>,
}

/// Authz engine service.
///
/// Owns the permission cache, the per-tenant compiled policy table and the
/// scope resolver. Stores are consulted only on cache or table misses.
pub struct Service {
    cache: PermissionCache,
    policy_store: Option<Arc<dyn PolicyStore>>,
    compiled: DashMap<String, PolicySlot>,
    /// Bumped by `clear_cache`; covers tenants without a slot yet.
    epoch: AtomicU64,
    scopes: DataScopeResolver,
}

impl Service {
    #[must_use]
    pub fn new(
        role_store: Arc<dyn RoleStore>,
        policy_store: Option<Arc<dyn PolicyStore>>,
        scopes: DataScopeResolver,
        cache_capacity: NonZeroUsize,
        cache_ttl: Duration,
    ) -> Self {
        let resolver = Arc::new(RoleResolver::new(role_store));
        Self {
            cache: PermissionCache::new(cache_capacity, cache_ttl, resolver),
            policy_store,
            compiled: DashMap::new(),
            epoch: AtomicU64::new(0),
            scopes,
        }
    }

    /// Compiled policies of `tenant_id`, compiling on first use.
    ///
    /// A set loaded across an invalidation is used for the current check but
    /// not kept.
    async fn policies_for(&self, tenant_id: &str) -> Result<Arc<[CompiledPolicy]>, DomainError> {
        let Some(store) = &self.policy_store else {
            return Ok(Arc::from(Vec::new()));
        };
        let epoch = self.epoch.load(Ordering::SeqCst);
        let generation = match self.compiled.get(tenant_id) {
            Some(slot) => {
                if let Some(hit) = &slot.policies {
                    return Ok(Arc::clone(hit));
                }
                slot.generation
            }
            None => 0,
        };

        let definitions = store.list_policies(tenant_id).await?;
        let compiled: Arc<[CompiledPolicy]> = compile_all(&definitions)?.into();

        let mut slot = self.compiled.entry(tenant_id.to_owned()).or_default();
        if slot.generation == generation && self.epoch.load(Ordering::SeqCst) == epoch {
            debug!(tenant_id, policies = compiled.len(), "Compiled tenant policies");
            slot.policies = Some(Arc::clone(&compiled));
        } else {
            debug!(tenant_id, "Policies invalidated during load, not caching");
        }
        Ok(compiled)
    }

    /// Decide one permission.
    ///
    /// Order: system subject, direct permission, effective permission set,
    /// then compiled policies. A matching policy rule overrides the set-based
    /// outcome; without a match the set-based outcome stands.
    ///
    /// # Errors
    ///
    /// - `InvalidPermissionCode` if the requested code is not concrete
    /// - `PolicyCompilation` if a tenant policy is malformed
    /// - store errors from role or policy loading
    #[tracing::instrument(
        skip_all,
        fields(
            tenant_id = %ctx.request.tenant_id(),
            subject_id = %ctx.request.subject().id,
            permission = tracing::field::Empty,
        )
    )]
    pub async fn check(&self, ctx: &CheckContext) -> Result<CheckResult, DomainError> {
        let started = Instant::now();
        let code = ctx.permission();
        tracing::Span::current().record("permission", code.as_str());
        permission::parse_code(&code)?;

        let subject = ctx.request.subject();
        let (allowed, reason) = if subject.is_system() {
            (true, DecisionReason::System)
        } else if subject
            .direct_permissions
            .iter()
            .any(|p| *p == code || p == DIRECT_WILDCARD)
        {
            (true, DecisionReason::DirectPermission)
        } else {
            self.decide(ctx, &code).await?
        };

        debug!(allowed, reason = %reason, "Permission check decided");
        Ok(CheckResult {
            allowed,
            permission: code,
            reason,
            evaluation_time: started.elapsed(),
        })
    }

    async fn decide(
        &self,
        ctx: &CheckContext,
        code: &str,
    ) -> Result<(bool, DecisionReason), DomainError> {
        let request = &ctx.request;
        let subject = request.subject();
        let effective = self
            .cache
            .get_or_load(request.tenant_id(), subject.subject_type, &subject.id, None)
            .await?;

        let mut outcome = match effective.grant_for(code) {
            Some(grant) => (
                true,
                DecisionReason::Granted {
                    grant: grant.to_owned(),
                },
            ),
            None => (false, DecisionReason::NotGranted),
        };

        let policies = self.policies_for(request.tenant_id()).await?;
        if !policies.is_empty() {
            let decision = evaluate(code, ctx, &policies).await;
            if let (Some(policy_id), Some(rule_index)) =
                (decision.matched_policy, decision.matched_rule_index)
            {
                outcome = (
                    decision.effect.is_allow(),
                    DecisionReason::Policy {
                        policy_id,
                        rule_index,
                        effect: decision.effect,
                    },
                );
            }
        }
        Ok(outcome)
    }

    /// # Errors
    ///
    /// The first error a single check raises.
    pub async fn check_many(&self, contexts: &[CheckContext]) -> Result<BatchCheckResult, DomainError> {
        let mut results = Vec::with_capacity(contexts.len());
        for ctx in contexts {
            results.push(self.check(ctx).await?);
        }
        Ok(BatchCheckResult::from_results(results))
    }

    /// # Errors
    ///
    /// `ScopeResolution` or hierarchy resolver errors.
    pub async fn resolve_scopes(
        &self,
        definitions: &[ScopeDefinition],
        request: &RequestContext,
        mode: Option<CombineMode>,
    ) -> Result<CombinedScope, DomainError> {
        Ok(self.scopes.resolve_scopes(definitions, request, mode).await?)
    }

    pub fn invalidate_subject(&self, tenant_id: &str, subject_id: &str) {
        let removed = self.cache.invalidate_subject(tenant_id, subject_id);
        debug!(tenant_id, subject_id, removed, "Invalidated subject permissions");
    }

    #[must_use]
    pub fn invalidate_tenant(&self, tenant_id: &str) -> usize {
        let removed = self.cache.invalidate_tenant(tenant_id);
        debug!(tenant_id, removed, "Invalidated tenant permissions");
        removed
    }

    pub fn invalidate_policies(&self, tenant_id: &str) {
        let mut slot = self.compiled.entry(tenant_id.to_owned()).or_default();
        slot.generation += 1;
        slot.policies = None;
    }

    /// Drops cached permission sets and compiled policies.
    pub fn clear_cache(&self) {
        self.cache.clear();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.compiled.clear();
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
