//! In-memory provider implementations.
//!
//! `MemoryCacheStore` backs the binary's simulation mode and the test
//! suites; the static probes report fixed values that tests can flip at
//! runtime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    BehaviorAnalytics, BehaviorPattern, CacheStore, CachedItemMeta, DeviceProbe, NetworkInfo,
    SessionStats, StoreError, StoreStats,
};
use crate::types::{ContentKey, Level, NetworkClass, PlaybackPosition, PriorityTier, Quality};

/// Size of a freshly fetched high-quality item in the simulated store.
const BASE_ITEM_BYTES: u64 = 512 * 1024;

/// An in-memory cache store.
pub struct MemoryCacheStore {
    items: RwLock<HashMap<ContentKey, CachedItemMeta>>,
    /// When set, `list()` fails; used to exercise eviction-abort paths.
    fail_enumeration: AtomicBool,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            fail_enumeration: AtomicBool::new(false),
        }
    }

    /// Insert an item with explicit metadata (test fixture hook).
    pub async fn insert(&self, meta: CachedItemMeta) {
        self.items.write().await.insert(meta.key.clone(), meta);
    }

    pub fn set_fail_enumeration(&self, fail: bool) {
        self.fail_enumeration.store(fail, Ordering::Relaxed);
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &ContentKey) -> Result<Option<CachedItemMeta>, StoreError> {
        let mut items = self.items.write().await;
        if let Some(meta) = items.get_mut(key) {
            meta.last_accessed = SystemTime::now();
            meta.access_count += 1;
            return Ok(Some(meta.clone()));
        }
        Ok(None)
    }

    async fn prefetch(&self, key: &ContentKey, quality: Quality) -> Result<u64, StoreError> {
        let mut items = self.items.write().await;
        let size = (BASE_ITEM_BYTES as f64 * quality.size_ratio()) as u64;
        let now = SystemTime::now();
        items.insert(
            key.clone(),
            CachedItemMeta {
                key: key.clone(),
                size_bytes: size,
                quality,
                tier: PriorityTier::Pregenerated,
                created_at: now,
                last_accessed: now,
                access_count: 0,
            },
        );
        Ok(size)
    }

    async fn delete(&self, key: &ContentKey) -> Result<bool, StoreError> {
        Ok(self.items.write().await.remove(key).is_some())
    }

    async fn downgrade(&self, key: &ContentKey, quality: Quality) -> Result<u64, StoreError> {
        let mut items = self.items.write().await;
        let meta = items
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        let new_size = (BASE_ITEM_BYTES as f64 * quality.size_ratio()) as u64;
        meta.quality = quality;
        meta.size_bytes = new_size.min(meta.size_bytes);
        Ok(meta.size_bytes)
    }

    async fn list(&self) -> Result<Vec<CachedItemMeta>, StoreError> {
        if self.fail_enumeration.load(Ordering::Relaxed) {
            return Err(StoreError::Enumeration("simulated failure".to_string()));
        }
        Ok(self.items.read().await.values().cloned().collect())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let items = self.items.read().await;
        let total_size = items.values().map(|m| m.size_bytes).sum();
        Ok(StoreStats {
            total_size,
            item_count: items.len(),
            oldest: items.values().map(|m| m.created_at).min(),
            newest: items.values().map(|m| m.created_at).max(),
        })
    }
}

/// A network probe reporting a settable fixed class and latency.
pub struct StaticNetworkInfo {
    class: StdMutex<NetworkClass>,
    latency_ms: AtomicU64,
}

impl StaticNetworkInfo {
    pub fn new(class: NetworkClass, latency: Duration) -> Self {
        Self {
            class: StdMutex::new(class),
            latency_ms: AtomicU64::new(latency.as_millis() as u64),
        }
    }

    pub fn set_class(&self, class: NetworkClass) {
        *self.class.lock().unwrap() = class;
    }
}

impl NetworkInfo for StaticNetworkInfo {
    fn network_class(&self) -> Option<NetworkClass> {
        Some(*self.class.lock().unwrap())
    }

    fn latency(&self) -> Option<Duration> {
        Some(Duration::from_millis(self.latency_ms.load(Ordering::Relaxed)))
    }
}

/// A device probe reporting fixed, settable readings.
pub struct StaticDeviceProbe {
    storage_used: AtomicU64,
    storage_total: AtomicU64,
    /// Battery level scaled by 1000 to fit an atomic.
    battery_milli: AtomicU64,
    charging: AtomicBool,
}

impl StaticDeviceProbe {
    pub fn new(storage_used: u64, storage_total: u64, battery_level: f64) -> Self {
        Self {
            storage_used: AtomicU64::new(storage_used),
            storage_total: AtomicU64::new(storage_total),
            battery_milli: AtomicU64::new((battery_level * 1000.0) as u64),
            charging: AtomicBool::new(false),
        }
    }

    pub fn set_battery_level(&self, level: f64) {
        self.battery_milli
            .store((level.clamp(0.0, 1.0) * 1000.0) as u64, Ordering::Relaxed);
    }

    pub fn set_storage_used(&self, used: u64) {
        self.storage_used.store(used, Ordering::Relaxed);
    }
}

impl DeviceProbe for StaticDeviceProbe {
    fn storage(&self) -> Option<(u64, u64)> {
        Some((
            self.storage_used.load(Ordering::Relaxed),
            self.storage_total.load(Ordering::Relaxed),
        ))
    }

    fn battery_level(&self) -> Option<f64> {
        Some(self.battery_milli.load(Ordering::Relaxed) as f64 / 1000.0)
    }

    fn is_charging(&self) -> Option<bool> {
        Some(self.charging.load(Ordering::Relaxed))
    }

    fn cpu_hint(&self) -> Option<usize> {
        Some(4)
    }
}

/// Analytics source replaying a scripted session.
pub struct ScriptedAnalytics {
    stats: StdMutex<SessionStats>,
    patterns: StdMutex<Vec<BehaviorPattern>>,
}

impl ScriptedAnalytics {
    pub fn new(position: PlaybackPosition) -> Self {
        Self {
            stats: StdMutex::new(SessionStats {
                position,
                reading_speed: 150.0,
                skip_rate: 0.0,
                hit_rate: 0.8,
                avg_load_time_ms: 250.0,
            }),
            patterns: StdMutex::new(Vec::new()),
        }
    }

    pub fn set_stats(&self, stats: SessionStats) {
        *self.stats.lock().unwrap() = stats;
    }

    pub fn set_patterns(&self, patterns: Vec<BehaviorPattern>) {
        *self.patterns.lock().unwrap() = patterns;
    }
}

impl BehaviorAnalytics for ScriptedAnalytics {
    fn session_stats(&self) -> Option<SessionStats> {
        Some(self.stats.lock().unwrap().clone())
    }

    fn matched_patterns(&self) -> Vec<BehaviorPattern> {
        self.patterns.lock().unwrap().clone()
    }
}

/// Default playback position for the simulation binary.
pub fn sim_position() -> PlaybackPosition {
    PlaybackPosition {
        book_id: "demo-book".to_string(),
        chunk_index: 0,
        sentence_index: 0,
        chunk_length: 40,
        level: Level::Original,
    }
}
