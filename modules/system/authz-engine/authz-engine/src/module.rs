//! Authz engine module: wires configuration and collaborators into a client.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;

use authz_engine_sdk::{AuthzEngineClient, HierarchyResolver, PolicyStore, RoleStore};
use tracing::info;

use crate::config::AuthzEngineConfig;
use crate::domain::cache::{BackingStore, RefreshAhead, WriteBehind, WriteThrough};
use crate::domain::scope::DataScopeResolver;
use crate::domain::{AuthzEngineLocalClient, DomainError, Service};

/// Module name used in logs.
pub const MODULE_NAME: &str = "authz-engine";

/// Built engine. Hands out the public client and cache strategies sized by
/// the module configuration.
pub struct AuthzEngineModule {
    config: AuthzEngineConfig,
    service: Arc<Service>,
}

impl AuthzEngineModule {
    #[must_use]
    pub fn builder(config: AuthzEngineConfig) -> AuthzEngineModuleBuilder {
        AuthzEngineModuleBuilder {
            config,
            role_store: None,
            policy_store: None,
            hierarchy: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthzEngineConfig {
        &self.config
    }

    #[must_use]
    pub fn service(&self) -> Arc<Service> {
        Arc::clone(&self.service)
    }

    #[must_use]
    pub fn client(&self) -> Arc<dyn AuthzEngineClient> {
        Arc::new(AuthzEngineLocalClient::new(self.service()))
    }

    fn capacity(&self) -> Result<NonZeroUsize, DomainError> {
        NonZeroUsize::new(self.config.cache.capacity).ok_or_else(|| {
            DomainError::InvalidConfig("cache.capacity must be greater than 0".to_owned())
        })
    }

    /// # Errors
    ///
    /// `InvalidConfig` if the cache capacity is zero.
    pub fn write_through<K, V>(
        &self,
        store: Arc<dyn BackingStore<K, V>>,
    ) -> Result<WriteThrough<K, V>, DomainError>
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        Ok(WriteThrough::new(
            self.capacity()?,
            self.config.cache.default_ttl(),
            store,
        ))
    }

    /// The returned cache is not flushing on a timer until
    /// [`WriteBehind::start`] is called.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the cache capacity is zero.
    pub fn write_behind<K, V>(
        &self,
        store: Arc<dyn BackingStore<K, V>>,
    ) -> Result<Arc<WriteBehind<K, V>>, DomainError>
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        Ok(Arc::new(WriteBehind::new(
            self.capacity()?,
            self.config.cache.default_ttl(),
            store,
            self.config.write_behind.max_batch_size,
            self.config.write_behind.flush_interval(),
        )))
    }

    /// # Errors
    ///
    /// `InvalidConfig` if the cache capacity is zero.
    pub fn refresh_ahead<K, V>(
        &self,
        store: Arc<dyn BackingStore<K, V>>,
    ) -> Result<Arc<RefreshAhead<K, V>>, DomainError>
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        Ok(Arc::new(RefreshAhead::new(
            self.capacity()?,
            self.config.cache.default_ttl(),
            store,
            self.config.refresh_ahead.refresh_threshold,
        )))
    }
}

pub struct AuthzEngineModuleBuilder {
    config: AuthzEngineConfig,
    role_store: Option<Arc<dyn RoleStore>>,
    policy_store: Option<Arc<dyn PolicyStore>>,
    hierarchy: Option<Arc<dyn HierarchyResolver>>,
}

impl AuthzEngineModuleBuilder {
    /// Required.
    #[must_use]
    pub fn role_store(mut self, store: Arc<dyn RoleStore>) -> Self {
        self.role_store = Some(store);
        self
    }

    /// Without a policy store checks use the permission set alone.
    #[must_use]
    pub fn policy_store(mut self, store: Arc<dyn PolicyStore>) -> Self {
        self.policy_store = Some(store);
        self
    }

    /// Needed only for `subordinates` scopes.
    #[must_use]
    pub fn hierarchy_resolver(mut self, resolver: Arc<dyn HierarchyResolver>) -> Self {
        self.hierarchy = Some(resolver);
        self
    }

    /// # Errors
    ///
    /// `InvalidConfig` if the configuration is invalid or no role store was
    /// supplied.
    #[tracing::instrument(skip_all)]
    pub fn build(self) -> Result<AuthzEngineModule, DomainError> {
        self.config.validate()?;
        let role_store = self.role_store.ok_or_else(|| {
            DomainError::InvalidConfig("a role store is required".to_owned())
        })?;
        let capacity = NonZeroUsize::new(self.config.cache.capacity).ok_or_else(|| {
            DomainError::InvalidConfig("cache.capacity must be greater than 0".to_owned())
        })?;

        info!(
            capacity = self.config.cache.capacity,
            ttl_secs = self.config.cache.default_ttl_secs,
            policies = self.policy_store.is_some(),
            hierarchy = self.hierarchy.is_some(),
            "Initializing {MODULE_NAME} module"
        );

        let scopes = DataScopeResolver::new(self.hierarchy, self.config.scopes.default_combine_mode);
        let service = Arc::new(Service::new(
            role_store,
            self.policy_store,
            scopes,
            capacity,
            self.config.cache.default_ttl(),
        ));

        info!("{MODULE_NAME} module initialized successfully");
        Ok(AuthzEngineModule {
            config: self.config,
            service,
        })
    }
}
