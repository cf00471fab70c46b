//! Data-scope resolution: declarative scopes to row-level filters.

use std::cmp::Reverse;
use std::sync::Arc;

use authz_engine_sdk::{
    AuthzError, CombineMode, CombinedScope, ContextRef, HierarchyResolver, ResolvedScope,
    ScopeCondition, ScopeDefinition, ScopeType, ScopeValueSource,
};
use authz_security::{RequestContext, ScopeFilter, ScopeValue, deduplicate, has_conflict};
use time::OffsetDateTime;
use tracing::warn;

/// Filter field emitted for tenant scopes.
pub const TENANT_FIELD: &str = "tenant_id";

pub struct DataScopeResolver {
    hierarchy: Option<Arc<dyn HierarchyResolver>>,
    default_mode: CombineMode,
}

impl DataScopeResolver {
    #[must_use]
    pub fn new(hierarchy: Option<Arc<dyn HierarchyResolver>>, default_mode: CombineMode) -> Self {
        Self {
            hierarchy,
            default_mode,
        }
    }

    /// # Errors
    ///
    /// `ScopeResolution` when a condition value cannot be produced or a
    /// `hierarchy` condition has no resolver; hierarchy resolver errors pass
    /// through unchanged.
    pub async fn resolve(
        &self,
        definition: &ScopeDefinition,
        ctx: &RequestContext,
    ) -> Result<ResolvedScope, AuthzError> {
        let filters = match definition.scope_type {
            ScopeType::All => Vec::new(),
            ScopeType::Tenant => vec![ScopeFilter::eq(TENANT_FIELD, ctx.tenant_id())],
            ScopeType::Department
            | ScopeType::Team
            | ScopeType::SelfOwned
            | ScopeType::Subordinates
            | ScopeType::Custom => {
                let mut filters = Vec::with_capacity(definition.conditions.len());
                for condition in &definition.conditions {
                    filters.push(self.resolve_condition(definition, condition, ctx).await?);
                }
                filters
            }
        };

        Ok(ResolvedScope {
            definition: definition.clone(),
            filters,
            resolved_at: OffsetDateTime::now_utc(),
        })
    }

    async fn resolve_condition(
        &self,
        definition: &ScopeDefinition,
        condition: &ScopeCondition,
        ctx: &RequestContext,
    ) -> Result<ScopeFilter, AuthzError> {
        let value = resolve_value(definition, &condition.value, ctx).await?;
        if let Some(op) = condition.operator.filter_operator() {
            return Ok(ScopeFilter::new(condition.field.clone(), op, value));
        }

        let root = root_id(&value).ok_or_else(|| {
            AuthzError::scope(
                &definition.id,
                format!("hierarchy root must be a scalar id, got {value}"),
            )
        })?;
        let resolver = self.hierarchy.as_ref().ok_or_else(|| {
            AuthzError::scope(&definition.id, "no hierarchy resolver configured")
        })?;
        let mut ids = resolver.resolve_root(&root).await?;
        if !ids.contains(&root) {
            ids.insert(0, root);
        }
        Ok(ScopeFilter::r#in(
            condition.field.clone(),
            ids.into_iter().map(ScopeValue::from).collect(),
        ))
    }

    /// Merge resolved scopes into one filter list.
    ///
    /// Scopes are ordered by descending priority. A non-combinable scope wins
    /// outright regardless of `mode`. Otherwise `and`/`or` flatten every
    /// filter and `priority` keeps the first scope that produced any.
    #[must_use]
    pub fn combine(mut scopes: Vec<ResolvedScope>, mode: CombineMode) -> Vec<ScopeFilter> {
        scopes.sort_by_key(|s| Reverse(s.definition.priority));

        if let Some(pos) = scopes.iter().position(|s| !s.definition.combinable) {
            return scopes.swap_remove(pos).filters;
        }

        match mode {
            CombineMode::And | CombineMode::Or => {
                scopes.into_iter().flat_map(|s| s.filters).collect()
            }
            CombineMode::Priority => scopes
                .into_iter()
                .find(|s| !s.filters.is_empty())
                .map(|s| s.filters)
                .unwrap_or_default(),
        }
    }

    /// Resolve every definition, combine, then deduplicate.
    ///
    /// # Errors
    ///
    /// The first resolution error.
    #[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant_id(), scopes = definitions.len()))]
    pub async fn resolve_scopes(
        &self,
        definitions: &[ScopeDefinition],
        ctx: &RequestContext,
        mode: Option<CombineMode>,
    ) -> Result<CombinedScope, AuthzError> {
        let mode = mode.unwrap_or(self.default_mode);
        let mut resolved = Vec::with_capacity(definitions.len());
        for definition in definitions {
            resolved.push(self.resolve(definition, ctx).await?);
        }

        let filters = deduplicate(Self::combine(resolved, mode));
        if has_conflict(&filters) {
            warn!(
                filters = ?filters.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "Scope filters contradict each other; the query will match nothing"
            );
        }
        Ok(CombinedScope { mode, filters })
    }
}

async fn resolve_value(
    definition: &ScopeDefinition,
    source: &ScopeValueSource,
    ctx: &RequestContext,
) -> Result<ScopeValue, AuthzError> {
    match source {
        ScopeValueSource::Static(value) => Ok(value.clone()),
        ScopeValueSource::Context(reference) => context_value(reference, ctx).ok_or_else(|| {
            AuthzError::scope(&definition.id, format!("no usable value at {reference}"))
        }),
        ScopeValueSource::Resolver(resolver) => resolver
            .resolve(ctx)
            .await
            .map_err(|e| AuthzError::scope(&definition.id, e.to_string())),
    }
}

fn context_value(reference: &ContextRef, ctx: &RequestContext) -> Option<ScopeValue> {
    match reference {
        ContextRef::TenantId => Some(ScopeValue::from(ctx.tenant_id())),
        ContextRef::SubjectId => Some(ScopeValue::from(ctx.subject().id.as_str())),
        ContextRef::SubjectMetadata(key) => ctx
            .subject()
            .metadata
            .get(key)
            .and_then(ScopeValue::from_json),
        ContextRef::Attribute(name) => ctx.attribute(name).and_then(ScopeValue::from_json),
    }
}

fn root_id(value: &ScopeValue) -> Option<String> {
    match value {
        ScopeValue::String(s) => Some(s.clone()),
        ScopeValue::Uuid(u) => Some(u.to_string()),
        ScopeValue::Int(n) => Some(n.to_string()),
        ScopeValue::Bool(_) | ScopeValue::List(_) => None,
    }
}
