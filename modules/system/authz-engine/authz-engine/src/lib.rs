//! Authz Engine Module
//!
//! Multi-tenant authorization decisions: permission checks backed by RBAC
//! role resolution and a TTL+LRU permission cache, declarative policies
//! evaluated first-match-wins, and data scopes resolved into row filters.
//!
//! Build with [`AuthzEngineModule::builder`] and hand the resulting
//! [`AuthzEngineClient`](authz_engine_sdk::AuthzEngineClient) to callers.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod config;
pub mod domain;
pub mod infra;
pub mod module;

pub use config::AuthzEngineConfig;
pub use module::{AuthzEngineModule, AuthzEngineModuleBuilder};
