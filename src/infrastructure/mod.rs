//! Infrastructure layer - chain access and shared caches

pub mod blockchain;
pub mod cache;
