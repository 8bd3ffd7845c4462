//! The tunable parameter set.
//!
//! A `TuningParams` value bundles every knob the tuner is allowed to touch
//! at runtime. The baseline copy never changes; the current copy absorbs
//! adopted experiments and auto-applied recommendations.

use serde::{Deserialize, Serialize};

/// Runtime-tunable policy parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningParams {
    /// Eviction age scaling factor.
    pub aging_factor: f64,

    /// Eviction behavior-component weight.
    pub behavior_weight: f64,

    /// Base sequential prefetch distance (sentences).
    pub base_prefetch_distance: usize,

    /// Multiplier applied on top of the base distance.
    pub prefetch_multiplier: f64,

    /// Hit-rate threshold above which quality may be upgraded.
    pub quality_upgrade_threshold: f64,

    /// Hit-rate threshold below which quality is downgraded.
    pub quality_downgrade_threshold: f64,

    /// Target storage utilization in [0,1].
    pub target_utilization: f64,
}

impl Default for TuningParams {
    fn default() -> Self {
        Self {
            aging_factor: 1.0,
            behavior_weight: 0.1,
            base_prefetch_distance: 10,
            prefetch_multiplier: 1.0,
            quality_upgrade_threshold: 0.85,
            quality_downgrade_threshold: 0.5,
            target_utilization: 0.8,
        }
    }
}

impl TuningParams {
    /// Effective prefetch distance after the multiplier.
    pub fn prefetch_distance(&self) -> usize {
        ((self.base_prefetch_distance as f64 * self.prefetch_multiplier).round() as usize).max(1)
    }

    /// Clamp every field to its sane range; applied after any mutation so a
    /// runaway experiment cannot push a parameter off the rails.
    pub fn clamped(mut self) -> Self {
        self.aging_factor = self.aging_factor.clamp(0.1, 5.0);
        self.behavior_weight = self.behavior_weight.clamp(0.0, 0.4);
        self.base_prefetch_distance = self.base_prefetch_distance.clamp(1, 50);
        self.prefetch_multiplier = self.prefetch_multiplier.clamp(0.25, 4.0);
        self.quality_upgrade_threshold = self.quality_upgrade_threshold.clamp(0.5, 1.0);
        self.quality_downgrade_threshold = self.quality_downgrade_threshold.clamp(0.0, 0.8);
        self.target_utilization = self.target_utilization.clamp(0.3, 0.95);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefetch_distance() {
        let p = TuningParams {
            base_prefetch_distance: 10,
            prefetch_multiplier: 1.5,
            ..TuningParams::default()
        };
        assert_eq!(p.prefetch_distance(), 15);
    }

    #[test]
    fn test_clamping() {
        let p = TuningParams {
            aging_factor: 100.0,
            prefetch_multiplier: 0.0,
            ..TuningParams::default()
        }
        .clamped();
        assert_eq!(p.aging_factor, 5.0);
        assert_eq!(p.prefetch_multiplier, 0.25);
    }
}
