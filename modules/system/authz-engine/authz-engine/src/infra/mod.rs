//! Infrastructure adapters.

pub mod storage;
