#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Security primitives shared by the authorization engine and its callers.
//!
//! - [`RequestContext`] - per-request tenant + subject + attributes
//! - [`ScopeFilter`] - one row-level filter produced by data-scope resolution
pub mod access_scope;
pub mod context;

pub use access_scope::{FilterOperator, ScopeFilter, ScopeValue, deduplicate, has_conflict};
pub use context::{RequestContext, RequestContextBuilder, Subject, SubjectType, Tenant, TenantStatus};
