#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Authz Engine SDK
//!
//! This crate provides the public API for the `authz_engine` module:
//!
//! - [`AuthzEngineClient`] - Public API trait for consumers
//! - [`permission`] - `resource:action` codes, wildcard matching, set algebra
//! - [`PolicyDefinition`], [`PolicyRule`], [`Condition`] - declarative policies
//! - [`ScopeDefinition`] - declarative data scopes
//! - [`RoleStore`], [`PolicyStore`], [`HierarchyResolver`] - collaborator ports
//! - [`AuthzError`] - Error types
//!
//! ## Usage
//!
//! ```ignore
//! use authz_engine_sdk::{AuthzEngineClient, CheckContext};
//!
//! let ctx = CheckContext::new(request.clone(), "order", "confirm");
//! let result = authz.check(ctx).await?;
//!
//! let scope = authz
//!     .resolve_scopes(&[ScopeDefinition::tenant("tenant")], &request, None)
//!     .await?;
//! ```

pub mod api;
pub mod conditions;
pub mod error;
pub mod models;
pub mod permission;
pub mod policy;
pub mod ports;
pub mod scope;

// Re-export main types at crate root
pub use api::AuthzEngineClient;
pub use error::AuthzError;
pub use models::{
    BatchCheckResult, CacheStats, CheckContext, CheckResult, DecisionReason, Effect,
    EffectivePermissions, NewRole, NewRoleBinding, Priority, RoleBinding, RoleDefinition,
    RoleFilter, RolePatch, RoleStatus, RoleType,
};
pub use permission::{Permission, PermissionSet};
pub use policy::{Condition, PolicyDefinition, PolicyRule};
pub use ports::{
    AttributeProvider, ConditionEvaluator, HierarchyResolver, PolicyStore, RoleStore,
    ScopeValueResolver,
};
pub use scope::{
    CombineMode, CombinedScope, ContextRef, ResolvedScope, ScopeCondition, ScopeDefinition,
    ScopeOperator, ScopeType, ScopeValueSource,
};
