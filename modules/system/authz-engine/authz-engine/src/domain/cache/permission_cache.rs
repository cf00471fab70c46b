//! Per-subject cache of effective permissions.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use authz_engine_sdk::{AuthzError, CacheStats, EffectivePermissions};
use authz_security::SubjectType;

use super::ttl_lru::TtlLruCache;
use crate::domain::roles::PermissionLoader;

/// Cache key. Displays as `permissions:<tenant>:<subject type>:<subject>`;
/// kept structured so invalidation compares ids instead of string prefixes.
///
/// Bindings are looked up per subject type, so a user and a service sharing
/// an id are distinct entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PermissionKey {
    pub tenant_id: String,
    pub subject_type: SubjectType,
    pub subject_id: String,
}

impl PermissionKey {
    #[must_use]
    pub fn new(tenant_id: &str, subject_type: SubjectType, subject_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_owned(),
            subject_type,
            subject_id: subject_id.to_owned(),
        }
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "permissions:{}:{}:{}",
            self.tenant_id,
            self.subject_type.as_str(),
            self.subject_id
        )
    }
}

/// Pure performance layer over a [`PermissionLoader`]: a cached set is always
/// one the loader produced.
///
/// Concurrent misses for the same key may both load and both write; the last
/// write wins.
pub struct PermissionCache {
    entries: TtlLruCache<PermissionKey, Arc<EffectivePermissions>>,
    loader: Arc<dyn PermissionLoader>,
}

impl PermissionCache {
    #[must_use]
    pub fn new(capacity: NonZeroUsize, default_ttl: Duration, loader: Arc<dyn PermissionLoader>) -> Self {
        Self {
            entries: TtlLruCache::new(capacity, default_ttl),
            loader,
        }
    }

    #[must_use]
    pub fn get(
        &self,
        tenant_id: &str,
        subject_type: SubjectType,
        subject_id: &str,
    ) -> Option<Arc<EffectivePermissions>> {
        self.entries
            .get(&PermissionKey::new(tenant_id, subject_type, subject_id))
    }

    pub fn set(
        &self,
        tenant_id: &str,
        subject_type: SubjectType,
        subject_id: &str,
        permissions: Arc<EffectivePermissions>,
        ttl: Option<Duration>,
    ) {
        self.entries.set(
            PermissionKey::new(tenant_id, subject_type, subject_id),
            permissions,
            ttl,
        );
    }

    /// On a miss, load through the loader and store the result with `ttl` or
    /// the default TTL.
    ///
    /// # Errors
    ///
    /// Whatever the loader returns; nothing is cached in that case.
    pub async fn get_or_load(
        &self,
        tenant_id: &str,
        subject_type: SubjectType,
        subject_id: &str,
        ttl: Option<Duration>,
    ) -> Result<Arc<EffectivePermissions>, AuthzError> {
        if let Some(hit) = self.get(tenant_id, subject_type, subject_id) {
            return Ok(hit);
        }
        let loaded = Arc::new(
            self.loader
                .load(tenant_id, subject_type, subject_id)
                .await?,
        );
        self.set(tenant_id, subject_type, subject_id, Arc::clone(&loaded), ttl);
        Ok(loaded)
    }

    /// Removes the subject's entries of every subject type; returns the count.
    pub fn invalidate_subject(&self, tenant_id: &str, subject_id: &str) -> usize {
        self.entries
            .remove_where(|k| k.tenant_id == tenant_id && k.subject_id == subject_id)
    }

    /// Removes every entry of `tenant_id` before returning.
    pub fn invalidate_tenant(&self, tenant_id: &str) -> usize {
        self.entries.remove_where(|k| k.tenant_id == tenant_id)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.entries.stats()
    }
}
