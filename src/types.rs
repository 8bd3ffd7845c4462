//! Shared domain types.
//!
//! A content unit is addressed by a [`ContentKey`] (book / chunk / level /
//! voice / sentence). Keys are the unit of caching, prefetching and
//! eviction; the engine never looks inside the audio payload itself.

use std::fmt;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// Reading difficulty level of a content unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    /// The original, unmodified text.
    Original,
    /// Vocabulary-simplified rendition.
    Simplified,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Original => write!(f, "original"),
            Level::Simplified => write!(f, "simplified"),
        }
    }
}

/// Audio quality tier of a cached item.
///
/// Quality downgrades replace an item with the next lower tier instead of
/// deleting it outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quality {
    Low,
    Medium,
    High,
}

impl Quality {
    /// The next lower quality, or None if already lowest.
    pub fn downgrade(&self) -> Option<Quality> {
        match self {
            Quality::High => Some(Quality::Medium),
            Quality::Medium => Some(Quality::Low),
            Quality::Low => None,
        }
    }

    /// Approximate size of an item at this quality relative to High.
    pub fn size_ratio(&self) -> f64 {
        match self {
            Quality::High => 1.0,
            Quality::Medium => 0.55,
            Quality::Low => 0.3,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::Low => write!(f, "low"),
            Quality::Medium => write!(f, "medium"),
            Quality::High => write!(f, "high"),
        }
    }
}

/// Value tier of a cached item, used by the eviction scorer.
///
/// Ordered from most to least protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriorityTier {
    /// Belongs to the book currently being read.
    CurrentBook,
    /// Belongs to a user-favorited book.
    Favorite,
    /// Recently opened book.
    Recent,
    /// Speculatively pregenerated, never explicitly requested.
    Pregenerated,
}

impl PriorityTier {
    /// Eviction pressure for this tier in [0,1]; higher = more expendable.
    pub fn eviction_pressure(&self) -> f64 {
        match self {
            PriorityTier::CurrentBook => 0.0,
            PriorityTier::Favorite => 0.35,
            PriorityTier::Recent => 0.65,
            PriorityTier::Pregenerated => 1.0,
        }
    }
}

/// Network connection class reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkClass {
    Slow2G,
    TwoG,
    ThreeG,
    FourG,
    Wifi,
    Unknown,
}

impl NetworkClass {
    /// Normalized bandwidth estimate in [0,1] (1.0 = WiFi-class).
    pub fn bandwidth_estimate(&self) -> f64 {
        match self {
            NetworkClass::Slow2G => 0.05,
            NetworkClass::TwoG => 0.1,
            NetworkClass::ThreeG => 0.35,
            NetworkClass::FourG => 0.7,
            NetworkClass::Wifi => 1.0,
            NetworkClass::Unknown => 0.3, // conservative default
        }
    }

    /// Fraction of cache quota reserved as headroom; faster networks can
    /// re-fetch cheaply so they keep less in reserve.
    pub fn reserved_headroom(&self) -> f64 {
        match self {
            NetworkClass::Slow2G | NetworkClass::TwoG => 0.25,
            NetworkClass::ThreeG => 0.15,
            NetworkClass::FourG => 0.1,
            NetworkClass::Wifi => 0.05,
            NetworkClass::Unknown => 0.15,
        }
    }

    /// Quality tier that fits this network class best.
    pub fn ideal_quality(&self) -> Quality {
        match self {
            NetworkClass::Slow2G | NetworkClass::TwoG => Quality::Low,
            NetworkClass::ThreeG => Quality::Medium,
            NetworkClass::FourG | NetworkClass::Wifi => Quality::High,
            NetworkClass::Unknown => Quality::Medium,
        }
    }
}

impl fmt::Display for NetworkClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkClass::Slow2G => write!(f, "slow-2g"),
            NetworkClass::TwoG => write!(f, "2g"),
            NetworkClass::ThreeG => write!(f, "3g"),
            NetworkClass::FourG => write!(f, "4g"),
            NetworkClass::Wifi => write!(f, "wifi"),
            NetworkClass::Unknown => write!(f, "unknown"),
        }
    }
}

/// Identifies a single content unit in the cache.
///
/// The deduplication identity of a prediction is `book + chunk + level +
/// sentence`; the voice is carried for fetch routing but two predictions
/// differing only in voice still collapse to one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentKey {
    pub book_id: String,
    pub chunk_index: u32,
    pub level: Level,
    pub voice: String,
    pub sentence_index: u32,
}

impl ContentKey {
    pub fn new(book_id: impl Into<String>, chunk_index: u32, sentence_index: u32) -> Self {
        Self {
            book_id: book_id.into(),
            chunk_index,
            level: Level::Original,
            voice: "default".to_string(),
            sentence_index,
        }
    }

    /// Deduplication identity (voice excluded).
    pub fn dedup_key(&self) -> (String, u32, Level, u32) {
        (
            self.book_id.clone(),
            self.chunk_index,
            self.level,
            self.sentence_index,
        )
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.book_id, self.chunk_index, self.level, self.voice, self.sentence_index
        )
    }
}

/// Current playback position within a book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackPosition {
    pub book_id: String,
    pub chunk_index: u32,
    pub sentence_index: u32,
    /// Sentences per chunk, as reported by the chunker.
    pub chunk_length: u32,
    pub level: Level,
}

/// One environmental reading used for strategy selection and policy
/// derivation. Built from the probes each cycle; probe failures substitute
/// conservative defaults rather than failing the cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvSnapshot {
    pub network_class: NetworkClass,
    pub latency: Duration,
    /// Battery charge level in [0,1].
    pub battery_level: f64,
    pub charging: bool,
    /// Fraction of the storage quota currently used, in [0,1].
    pub storage_utilization: f64,
    /// Sentences per minute.
    pub reading_speed: f64,
    /// Fraction of sentences skipped, in [0,1].
    pub skip_rate: f64,
}

impl Default for EnvSnapshot {
    fn default() -> Self {
        // Conservative stand-ins for unavailable probes.
        Self {
            network_class: NetworkClass::Unknown,
            latency: Duration::from_millis(200),
            battery_level: 0.5,
            charging: false,
            storage_utilization: 0.5,
            reading_speed: 150.0,
            skip_rate: 0.0,
        }
    }
}

/// Wall-clock seconds since the epoch, for API payloads.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
