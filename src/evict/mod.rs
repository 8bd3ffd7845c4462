//! Cache eviction: keeps stored content within quota.
//!
//! - [`policy`]: network-class-specific eviction parameters
//! - [`evictor`]: scored eviction/downgrade passes against the cache store

pub mod evictor;
pub mod policy;
