//! Eviction policy parameters, re-derived per pass from the current
//! network class.
//!
//! Slow networks keep a larger reserved headroom (re-fetching is costly)
//! and avoid deleting outright where a quality downgrade will do; fast
//! networks evict aggressively since anything can be re-fetched cheaply.

use crate::config::EvictionConfig;
use crate::types::NetworkClass;

/// Score component weights, adjustable at runtime by the tuner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvictionWeights {
    pub priority: f64,
    pub age: f64,
    pub access: f64,
    pub recency: f64,
    pub quality: f64,
    pub size: f64,
    pub behavior: f64,
}

impl EvictionWeights {
    pub fn from_config(config: &EvictionConfig) -> Self {
        Self {
            priority: config.priority_weight,
            age: config.age_weight,
            access: config.access_weight,
            recency: config.recency_weight,
            quality: config.quality_weight,
            size: config.size_weight,
            behavior: config.behavior_weight,
        }
    }
}

/// One pass's worth of eviction parameters.
#[derive(Debug, Clone)]
pub struct EvictionPolicy {
    pub weights: EvictionWeights,

    /// Age scaling factor applied to the age component.
    pub aging_factor: f64,

    /// Fraction of the quota kept free as headroom.
    pub reserved_headroom: f64,

    /// Cache size ceiling in bytes.
    pub max_cache_bytes: u64,

    /// Whether quality downgrade may replace deletion.
    pub allow_downgrade: bool,

    /// Size ceiling for the size component.
    pub size_cap_bytes: u64,

    /// Minimum fractional savings for a downgrade to be worthwhile.
    pub min_downgrade_savings: f64,
}

impl EvictionPolicy {
    /// Derive the policy for the given network class.
    pub fn for_network(config: &EvictionConfig, class: NetworkClass) -> Self {
        let allow_downgrade = match class {
            // On slow links a downgrade still avoids an expensive re-fetch.
            NetworkClass::Slow2G | NetworkClass::TwoG | NetworkClass::ThreeG => true,
            NetworkClass::FourG | NetworkClass::Wifi => false,
            NetworkClass::Unknown => true,
        };

        Self {
            weights: EvictionWeights::from_config(config),
            aging_factor: config.aging_factor,
            reserved_headroom: class.reserved_headroom(),
            max_cache_bytes: config.max_cache_bytes,
            allow_downgrade,
            size_cap_bytes: config.size_cap_bytes,
            min_downgrade_savings: config.min_downgrade_savings,
        }
    }

    /// Size above which an eviction pass is triggered.
    pub fn trigger_bytes(&self) -> u64 {
        (self.max_cache_bytes as f64 * (1.0 - self.reserved_headroom)) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_shrinks_on_slow_networks() {
        let config = EvictionConfig::default();
        let slow = EvictionPolicy::for_network(&config, NetworkClass::TwoG);
        let fast = EvictionPolicy::for_network(&config, NetworkClass::Wifi);
        assert!(slow.trigger_bytes() < fast.trigger_bytes());
    }

    #[test]
    fn test_downgrade_allowed_only_on_slow_networks() {
        let config = EvictionConfig::default();
        assert!(EvictionPolicy::for_network(&config, NetworkClass::ThreeG).allow_downgrade);
        assert!(!EvictionPolicy::for_network(&config, NetworkClass::Wifi).allow_downgrade);
    }
}
