//! Domain layer for the authz engine.

pub mod cache;
pub mod error;
pub mod hooks;
pub mod local_client;
pub mod policy;
pub mod roles;
pub mod scope;
pub mod service;

pub use error::DomainError;
pub use local_client::AuthzEngineLocalClient;
pub use service::Service;
