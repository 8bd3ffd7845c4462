//! External collaborator interfaces.
//!
//! The engine never owns the cache store, the device probes, or the
//! behavior analytics pipeline; it consumes them through these traits:
//! - [`CacheStore`]: the key-value audio/content cache
//! - [`NetworkInfo`]: current network class and latency
//! - [`DeviceProbe`]: storage quota, battery, CPU hints
//! - [`BehaviorAnalytics`]: session stats and matched behavior patterns
//!
//! [`memory`] provides in-memory implementations used by the binary's
//! simulation mode and by tests.

pub mod memory;

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{ContentKey, NetworkClass, PlaybackPosition, PriorityTier, Quality};

/// Errors surfaced by the cache store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("item not found: {0}")]
    NotFound(String),

    #[error("store enumeration failed: {0}")]
    Enumeration(String),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("fetch failed for {key}: {reason}")]
    Fetch { key: String, reason: String },
}

/// Metadata for one cached item, as enumerated from the store.
#[derive(Debug, Clone)]
pub struct CachedItemMeta {
    pub key: ContentKey,
    pub size_bytes: u64,
    pub quality: Quality,
    pub tier: PriorityTier,
    pub created_at: SystemTime,
    pub last_accessed: SystemTime,
    pub access_count: u64,
}

/// Aggregate store statistics and quota usage.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub total_size: u64,
    pub item_count: usize,
    pub oldest: Option<SystemTime>,
    pub newest: Option<SystemTime>,
}

/// The key-value audio/content cache store.
///
/// Persistence, encoding and actual content generation live behind this
/// trait; the engine only decides what to fetch, keep, downgrade or delete.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up an item; `Ok(None)` is a miss.
    async fn get(&self, key: &ContentKey) -> Result<Option<CachedItemMeta>, StoreError>;

    /// Ask the store to materialize an item at the given quality (fetching
    /// or generating as needed). Returns the stored size in bytes.
    async fn prefetch(&self, key: &ContentKey, quality: Quality) -> Result<u64, StoreError>;

    /// Delete an item. Returns true if it existed.
    async fn delete(&self, key: &ContentKey) -> Result<bool, StoreError>;

    /// Replace an item with a lower-quality rendition. Returns the new size.
    async fn downgrade(&self, key: &ContentKey, quality: Quality) -> Result<u64, StoreError>;

    /// Enumerate all cached items. Eviction passes abort on failure here.
    async fn list(&self) -> Result<Vec<CachedItemMeta>, StoreError>;

    /// Aggregate statistics and quota usage.
    async fn stats(&self) -> Result<StoreStats, StoreError>;
}

/// Current network conditions.
///
/// Implementations should be cheap to call; the engine polls them every
/// cycle. A failing probe should return `None` and the engine substitutes
/// conservative defaults.
pub trait NetworkInfo: Send + Sync {
    fn network_class(&self) -> Option<NetworkClass>;
    fn latency(&self) -> Option<Duration>;
}

/// Device resource probes.
pub trait DeviceProbe: Send + Sync {
    /// Storage quota (used, total) in bytes.
    fn storage(&self) -> Option<(u64, u64)>;

    /// Battery charge level in [0,1].
    fn battery_level(&self) -> Option<f64>;

    fn is_charging(&self) -> Option<bool>;

    /// Logical CPU count hint.
    fn cpu_hint(&self) -> Option<usize>;
}

/// A matched behavior pattern emitted by the analytics pipeline.
#[derive(Debug, Clone)]
pub struct BehaviorPattern {
    /// Pattern confidence in [0,1].
    pub confidence: f64,

    /// Suggested sentence offset ahead of the current position.
    pub suggested_offset: u32,

    /// Human-readable pattern tag (e.g. "evening-binge", "re-listen").
    pub tag: String,
}

/// Session statistics from the analytics pipeline.
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub position: PlaybackPosition,

    /// Sentences per minute.
    pub reading_speed: f64,

    /// Fraction of sentences skipped, in [0,1].
    pub skip_rate: f64,

    /// Observed prefetch hit rate for this session, in [0,1].
    pub hit_rate: f64,

    /// Average content load time in milliseconds.
    pub avg_load_time_ms: f64,
}

/// Consumer of the behavior analytics output (never its implementation).
pub trait BehaviorAnalytics: Send + Sync {
    fn session_stats(&self) -> Option<SessionStats>;
    fn matched_patterns(&self) -> Vec<BehaviorPattern>;
}
