//! The health monitor aggregates signals from the whole engine into five
//! 0-100 sub-scores, a weighted overall score with a letter grade, and
//! tiered alerts for the downstream consumer.
//!
//! Weights: storage 25%, performance 30%, network adaptation 20%,
//! quality fit 15%, fragmentation 10%.

use serde::Serialize;

use crate::config::HealthConfig;
use crate::types::{NetworkClass, Quality};

const STORAGE_WEIGHT: f64 = 0.25;
const PERFORMANCE_WEIGHT: f64 = 0.30;
const NETWORK_WEIGHT: f64 = 0.20;
const QUALITY_WEIGHT: f64 = 0.15;
const FRAGMENTATION_WEIGHT: f64 = 0.10;

/// Load time at or below which the performance sub-score is perfect.
const IDEAL_LOAD_TIME_MS: f64 = 200.0;

/// Load time at which the load-time contribution bottoms out.
const WORST_LOAD_TIME_MS: f64 = 5000.0;

/// Alert severity tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// One raised alert.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub severity: Severity,
    pub category: String,
    pub message: String,
    pub suggested_actions: Vec<String>,
}

/// Raw inputs to one health computation, gathered from the store, the
/// scheduler and the analytics output.
#[derive(Debug, Clone)]
pub struct HealthInputs {
    /// Storage fragmentation level in [0,1].
    pub fragmentation: f64,

    /// Useful bytes over stored bytes, in [0,1].
    pub quota_efficiency: f64,

    /// Prefetch hit rate in [0,1].
    pub hit_rate: f64,

    /// Average content load time in milliseconds.
    pub avg_load_time_ms: f64,

    /// Storage quota utilization in [0,1].
    pub utilization: f64,

    /// Fraction of cached bytes spent per quality tier.
    pub quality_distribution: Vec<(Quality, f64)>,

    /// Fraction of granted bandwidth actually used, in [0,1].
    pub bandwidth_efficiency: f64,

    pub network_class: NetworkClass,
}

/// A computed health snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub storage: f64,
    pub performance: f64,
    pub network: f64,
    pub quality: f64,
    pub fragmentation: f64,

    /// Weighted overall score, 0-100.
    pub overall: f64,
    pub grade: char,
    pub alerts: Vec<Alert>,
}

/// The health monitor.
pub struct HealthMonitor {
    config: HealthConfig,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig) -> Self {
        Self { config }
    }

    /// Compute a snapshot from the given inputs.
    pub fn compute(&self, inputs: &HealthInputs) -> HealthSnapshot {
        let storage =
            ((1.0 - inputs.fragmentation) * inputs.quota_efficiency).clamp(0.0, 1.0) * 100.0;

        let load_score = 1.0
            - ((inputs.avg_load_time_ms - IDEAL_LOAD_TIME_MS)
                / (WORST_LOAD_TIME_MS - IDEAL_LOAD_TIME_MS))
                .clamp(0.0, 1.0);
        let performance = ((inputs.hit_rate + load_score) / 2.0).clamp(0.0, 1.0) * 100.0;

        let fit = quality_fit(&inputs.quality_distribution, inputs.network_class);
        let network =
            ((fit + inputs.bandwidth_efficiency.clamp(0.0, 1.0)) / 2.0).clamp(0.0, 1.0) * 100.0;

        let quality = fit * 100.0;

        let fragmentation = (1.0 - inputs.fragmentation).clamp(0.0, 1.0) * 100.0;

        let overall = storage * STORAGE_WEIGHT
            + performance * PERFORMANCE_WEIGHT
            + network * NETWORK_WEIGHT
            + quality * QUALITY_WEIGHT
            + fragmentation * FRAGMENTATION_WEIGHT;

        HealthSnapshot {
            storage,
            performance,
            network,
            quality,
            fragmentation,
            overall,
            grade: grade(overall),
            alerts: self.alerts(inputs, overall),
        }
    }

    fn alerts(&self, inputs: &HealthInputs, overall: f64) -> Vec<Alert> {
        let mut alerts = Vec::new();

        if inputs.utilization > self.config.critical_utilization {
            alerts.push(Alert {
                severity: Severity::Critical,
                category: "storage".to_string(),
                message: format!(
                    "cache utilization {:.0}% exceeds {:.0}%",
                    inputs.utilization * 100.0,
                    self.config.critical_utilization * 100.0
                ),
                suggested_actions: vec![
                    "run an eviction pass".to_string(),
                    "lower the target utilization".to_string(),
                ],
            });
        }

        if inputs.avg_load_time_ms > self.config.warning_load_time_ms {
            alerts.push(Alert {
                severity: Severity::Warning,
                category: "performance".to_string(),
                message: format!(
                    "average load time {:.0}ms exceeds {:.0}ms",
                    inputs.avg_load_time_ms, self.config.warning_load_time_ms
                ),
                suggested_actions: vec![
                    "increase prefetch distance".to_string(),
                    "lower quality on slow networks".to_string(),
                ],
            });
        }

        if inputs.hit_rate < self.config.warning_hit_rate {
            alerts.push(Alert {
                severity: Severity::Warning,
                category: "performance".to_string(),
                message: format!("prefetch hit rate {:.0}% is low", inputs.hit_rate * 100.0),
                suggested_actions: vec!["review active strategy fit".to_string()],
            });
        }

        if overall < 50.0 {
            alerts.push(Alert {
                severity: Severity::Critical,
                category: "overall".to_string(),
                message: format!("overall cache health {overall:.0} is failing"),
                suggested_actions: vec!["reset tuning parameters to baseline".to_string()],
            });
        }

        alerts
    }
}

/// How closely the cached quality distribution matches the ideal for the
/// current network class, in [0,1].
fn quality_fit(distribution: &[(Quality, f64)], class: NetworkClass) -> f64 {
    let total: f64 = distribution.iter().map(|(_, f)| f).sum();
    if total <= 0.0 {
        // An empty cache fits any network.
        return 1.0;
    }
    let ideal = class.ideal_quality();
    let matching: f64 = distribution
        .iter()
        .filter(|(q, _)| *q == ideal)
        .map(|(_, f)| f)
        .sum();
    // Half credit for adjacent tiers.
    let adjacent: f64 = distribution
        .iter()
        .filter(|(q, _)| q.downgrade() == Some(ideal) || ideal.downgrade() == Some(*q))
        .map(|(_, f)| f)
        .sum();
    ((matching + 0.5 * adjacent) / total).clamp(0.0, 1.0)
}

fn grade(overall: f64) -> char {
    match overall {
        o if o >= 90.0 => 'A',
        o if o >= 80.0 => 'B',
        o if o >= 70.0 => 'C',
        o if o >= 60.0 => 'D',
        _ => 'F',
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy_inputs() -> HealthInputs {
        HealthInputs {
            fragmentation: 0.1,
            quota_efficiency: 0.9,
            hit_rate: 0.9,
            avg_load_time_ms: 200.0,
            utilization: 0.6,
            quality_distribution: vec![(Quality::High, 1.0)],
            bandwidth_efficiency: 0.9,
            network_class: NetworkClass::Wifi,
        }
    }

    fn monitor() -> HealthMonitor {
        HealthMonitor::new(HealthConfig::default())
    }

    #[test]
    fn test_healthy_snapshot_grades_high() {
        let snapshot = monitor().compute(&healthy_inputs());
        assert!(snapshot.overall > 80.0);
        assert!(matches!(snapshot.grade, 'A' | 'B'));
        assert!(snapshot.alerts.is_empty());
    }

    #[test]
    fn test_scores_stay_in_range() {
        let mut inputs = healthy_inputs();
        inputs.fragmentation = 1.5; // out-of-range input
        inputs.avg_load_time_ms = 100_000.0;
        inputs.hit_rate = 0.5;
        let snapshot = monitor().compute(&inputs);
        for score in [
            snapshot.storage,
            snapshot.performance,
            snapshot.network,
            snapshot.quality,
            snapshot.fragmentation,
            snapshot.overall,
        ] {
            assert!((0.0..=100.0).contains(&score), "score {score}");
        }
    }

    #[test]
    fn test_critical_utilization_alert() {
        let mut inputs = healthy_inputs();
        inputs.utilization = 0.97;
        let snapshot = monitor().compute(&inputs);
        assert!(snapshot
            .alerts
            .iter()
            .any(|a| a.severity == Severity::Critical && a.category == "storage"));
    }

    #[test]
    fn test_slow_load_time_warning() {
        let mut inputs = healthy_inputs();
        inputs.avg_load_time_ms = 3500.0;
        let snapshot = monitor().compute(&inputs);
        assert!(snapshot
            .alerts
            .iter()
            .any(|a| a.severity == Severity::Warning && a.category == "performance"));
    }

    #[test]
    fn test_quality_fit_prefers_ideal_distribution() {
        let all_high = vec![(Quality::High, 1.0)];
        let all_low = vec![(Quality::Low, 1.0)];
        assert!(
            quality_fit(&all_high, NetworkClass::Wifi) > quality_fit(&all_low, NetworkClass::Wifi)
        );
        assert!(
            quality_fit(&all_low, NetworkClass::TwoG) > quality_fit(&all_high, NetworkClass::TwoG)
        );
    }

    #[test]
    fn test_grades() {
        assert_eq!(grade(95.0), 'A');
        assert_eq!(grade(85.0), 'B');
        assert_eq!(grade(72.0), 'C');
        assert_eq!(grade(61.0), 'D');
        assert_eq!(grade(30.0), 'F');
    }
}
