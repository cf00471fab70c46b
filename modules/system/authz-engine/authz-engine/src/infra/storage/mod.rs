//! Collaborator implementations.

pub mod memory;

pub use memory::{InMemoryPolicyStore, InMemoryRoleStore, StaticHierarchyResolver};
