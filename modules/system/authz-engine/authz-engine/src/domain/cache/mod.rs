//! Caching: the TTL+LRU store, the permission cache built on it, and the
//! cache-plus-store consistency strategies.

pub mod permission_cache;
pub mod strategies;
pub mod ttl_lru;

pub use permission_cache::{PermissionCache, PermissionKey};
pub use strategies::{BackingStore, RefreshAhead, WriteBehind, WriteThrough};
pub use ttl_lru::{CacheEntry, TtlLruCache};
