//! The adaptive tuner: rolling metric history, threshold-driven
//! recommendations, and the experiment lifecycle around the current
//! parameter set.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::TuningConfig;
use crate::tune::experiment::{Experiment, ExperimentError, ExperimentOutcome};
use crate::tune::params::TuningParams;

/// One health-derived metric sample.
#[derive(Debug, Clone, Copy)]
pub struct MetricSample {
    pub at: Instant,

    /// Overall health score, 0-100. The experiment comparison metric.
    pub overall_score: f64,

    pub hit_rate: f64,

    /// Fraction of prefetched items actually consumed.
    pub prefetch_accuracy: f64,

    /// Useful bytes over stored bytes.
    pub storage_efficiency: f64,

    /// Proxy for user satisfaction (uninterrupted playback fraction).
    pub satisfaction: f64,
}

/// A point recommendation derived from threshold crossings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Recommendation {
    /// Low hit rate: age items out faster to make room for better guesses.
    IncreaseAgingFactor { confidence: f64, expected: f64 },
    /// Moderately low prefetch accuracy: look further ahead.
    IncreasePrefetchDistance { confidence: f64, expected: f64 },
    /// Very low prefetch accuracy: stop wasting bandwidth on long shots.
    DecreasePrefetchDistance { confidence: f64, expected: f64 },
    /// Low satisfaction: lean harder on behavior signals when evicting.
    IncreaseBehaviorWeight { confidence: f64, expected: f64 },
    /// Low storage efficiency: aim for a smaller resident set.
    LowerTargetUtilization { confidence: f64, expected: f64 },
}

impl Recommendation {
    pub fn confidence(&self) -> f64 {
        match self {
            Recommendation::IncreaseAgingFactor { confidence, .. }
            | Recommendation::IncreasePrefetchDistance { confidence, .. }
            | Recommendation::DecreasePrefetchDistance { confidence, .. }
            | Recommendation::IncreaseBehaviorWeight { confidence, .. }
            | Recommendation::LowerTargetUtilization { confidence, .. } => *confidence,
        }
    }

    pub fn expected_improvement(&self) -> f64 {
        match self {
            Recommendation::IncreaseAgingFactor { expected, .. }
            | Recommendation::IncreasePrefetchDistance { expected, .. }
            | Recommendation::DecreasePrefetchDistance { expected, .. }
            | Recommendation::IncreaseBehaviorWeight { expected, .. }
            | Recommendation::LowerTargetUtilization { expected, .. } => *expected,
        }
    }

    /// Apply this recommendation to a parameter set.
    pub fn apply(&self, params: &TuningParams) -> TuningParams {
        let mut next = params.clone();
        match self {
            Recommendation::IncreaseAgingFactor { .. } => next.aging_factor *= 1.25,
            Recommendation::IncreasePrefetchDistance { .. } => {
                next.base_prefetch_distance += 3;
            }
            Recommendation::DecreasePrefetchDistance { .. } => {
                next.base_prefetch_distance = next.base_prefetch_distance.saturating_sub(3);
            }
            Recommendation::IncreaseBehaviorWeight { .. } => next.behavior_weight += 0.05,
            Recommendation::LowerTargetUtilization { .. } => next.target_utilization -= 0.05,
        }
        next.clamped()
    }
}

/// The adaptive tuner.
pub struct AdaptiveTuner {
    config: TuningConfig,
    baseline: TuningParams,
    current: TuningParams,
    history: VecDeque<MetricSample>,
    active: Option<Experiment>,
    archive: VecDeque<Experiment>,
}

impl AdaptiveTuner {
    pub fn new(config: TuningConfig, baseline: TuningParams) -> Self {
        Self {
            config,
            current: baseline.clone(),
            baseline,
            history: VecDeque::new(),
            active: None,
            archive: VecDeque::new(),
        }
    }

    pub fn current_params(&self) -> &TuningParams {
        &self.current
    }

    pub fn baseline_params(&self) -> &TuningParams {
        &self.baseline
    }

    pub fn active_experiment(&self) -> Option<&Experiment> {
        self.active.as_ref()
    }

    pub fn archive(&self) -> impl Iterator<Item = &Experiment> {
        self.archive.iter()
    }

    /// Record one metric sample; feeds both the rolling history and any
    /// running experiment.
    pub fn record_sample(&mut self, sample: MetricSample) {
        if let Some(exp) = self.active.as_mut() {
            exp.record_sample(sample.at, sample.overall_score);
        }
        self.history.push_back(sample);
        while self.history.len() > self.config.history_len {
            self.history.pop_front();
        }
    }

    fn trailing<F: Fn(&MetricSample) -> f64>(&self, n: usize, f: F) -> Option<f64> {
        if self.history.is_empty() {
            return None;
        }
        let tail: Vec<f64> = self.history.iter().rev().take(n).map(|s| f(s)).collect();
        Some(tail.iter().sum::<f64>() / tail.len() as f64)
    }

    /// Start an experiment that swaps in `variant` for a bounded window.
    pub fn start_experiment(
        &mut self,
        name: impl Into<String>,
        variant: TuningParams,
    ) -> Result<Uuid, ExperimentError> {
        if self.active.is_some() {
            return Err(ExperimentError::AlreadyActive);
        }

        let control_history: Vec<f64> = self
            .history
            .iter()
            .rev()
            .take(self.config.trailing_samples)
            .map(|s| s.overall_score)
            .collect();

        let experiment = Experiment::start(
            name,
            self.current.clone(),
            variant.clone().clamped(),
            &control_history,
            Duration::from_secs(self.config.max_experiment_secs),
            self.config.significance,
        )?;
        let id = experiment.id;

        info!(
            experiment = %experiment.name,
            control_baseline = experiment.control_baseline,
            "Starting experiment"
        );
        self.current = variant.clamped();
        self.active = Some(experiment);
        Ok(id)
    }

    /// Advance the active experiment, ending it when its duration expires
    /// or the variant is clearly losing. Returns the outcome when the
    /// experiment ends this tick.
    pub fn experiment_tick(&mut self, now: Instant) -> Option<ExperimentOutcome> {
        let exp = self.active.as_ref()?;

        if exp.should_terminate_early(self.config.trailing_samples, self.config.early_stop_drop) {
            return Some(self.conclude(ExperimentOutcome::EarlyTerminated));
        }

        if exp.elapsed(now) >= exp.duration {
            let outcome = exp.evaluate(self.config.trailing_samples, self.config.min_samples);
            return Some(self.conclude(outcome));
        }

        None
    }

    /// Abort the active experiment after an execution error. The
    /// pre-experiment parameters are restored; leaving the variant in
    /// place on error would silently adopt untested parameters.
    pub fn fail_experiment(&mut self) -> Option<ExperimentOutcome> {
        self.active.as_ref()?;
        warn!("Experiment failed, rolling back parameters");
        Some(self.conclude(ExperimentOutcome::Failed))
    }

    fn conclude(&mut self, outcome: ExperimentOutcome) -> ExperimentOutcome {
        let mut exp = self.active.take().expect("caller checked active");

        match outcome {
            ExperimentOutcome::Adopted => {
                info!(
                    experiment = %exp.name,
                    improvement = exp.improvement(self.config.trailing_samples),
                    "Experiment adopted"
                );
                self.current = exp.variant_params.clone();
            }
            ExperimentOutcome::Reverted
            | ExperimentOutcome::EarlyTerminated
            | ExperimentOutcome::Failed => {
                info!(experiment = %exp.name, ?outcome, "Experiment reverted");
                self.current = exp.control_params.clone();
            }
        }

        exp.finish(outcome);
        self.archive.push_back(exp);
        while self.archive.len() > self.config.archive_len {
            self.archive.pop_front();
        }
        outcome
    }

    /// Threshold-crossing recommendations from the trailing averages.
    pub fn recommendations(&self) -> Vec<Recommendation> {
        let n = self.config.trailing_samples;
        let mut out = Vec::new();

        if let Some(hit_rate) = self.trailing(n, |s| s.hit_rate) {
            if hit_rate < 0.5 {
                out.push(Recommendation::IncreaseAgingFactor {
                    confidence: 0.8,
                    expected: 0.1,
                });
            }
        }

        if let Some(accuracy) = self.trailing(n, |s| s.prefetch_accuracy) {
            if accuracy < 0.3 {
                out.push(Recommendation::DecreasePrefetchDistance {
                    confidence: 0.75,
                    expected: 0.08,
                });
            } else if accuracy < 0.6 {
                out.push(Recommendation::IncreasePrefetchDistance {
                    confidence: 0.6,
                    expected: 0.05,
                });
            }
        }

        if let Some(satisfaction) = self.trailing(n, |s| s.satisfaction) {
            if satisfaction < 0.6 {
                out.push(Recommendation::IncreaseBehaviorWeight {
                    confidence: 0.7,
                    expected: 0.06,
                });
            }
        }

        if let Some(efficiency) = self.trailing(n, |s| s.storage_efficiency) {
            if efficiency < 0.5 {
                out.push(Recommendation::LowerTargetUtilization {
                    confidence: 0.85,
                    expected: 0.07,
                });
            }
        }

        out
    }

    /// Apply recommendations above the confidence and expected-improvement
    /// floors. Skipped entirely while an experiment runs, so the variant is
    /// measured unperturbed.
    pub fn auto_apply(&mut self) -> Vec<Recommendation> {
        if self.active.is_some() {
            return Vec::new();
        }

        let applied: Vec<Recommendation> = self
            .recommendations()
            .into_iter()
            .filter(|r| {
                r.confidence() >= self.config.auto_apply_confidence
                    && r.expected_improvement() >= self.config.auto_apply_improvement
            })
            .collect();

        for rec in &applied {
            info!(?rec, "Auto-applying recommendation");
            self.current = rec.apply(&self.current);
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(score: f64) -> MetricSample {
        MetricSample {
            at: Instant::now(),
            overall_score: score,
            hit_rate: 0.8,
            prefetch_accuracy: 0.8,
            storage_efficiency: 0.8,
            satisfaction: 0.9,
        }
    }

    fn tuner() -> AdaptiveTuner {
        AdaptiveTuner::new(TuningConfig::default(), TuningParams::default())
    }

    #[test]
    fn test_experiment_adoption_flow() {
        let mut t = tuner();
        for _ in 0..5 {
            t.record_sample(sample(70.0));
        }

        let variant = TuningParams {
            aging_factor: 1.5,
            ..TuningParams::default()
        };
        t.start_experiment("aging-up", variant.clone()).unwrap();
        assert_eq!(t.current_params().aging_factor, 1.5);

        for _ in 0..5 {
            t.record_sample(sample(75.0));
        }

        // Force evaluation by pretending the duration elapsed.
        let later = Instant::now() + Duration::from_secs(3601);
        let outcome = t.experiment_tick(later).unwrap();
        assert_eq!(outcome, ExperimentOutcome::Adopted);
        assert_eq!(t.current_params().aging_factor, 1.5);
        assert_eq!(t.archive().count(), 1);
    }

    #[test]
    fn test_experiment_reversion_restores_control() {
        let mut t = tuner();
        for _ in 0..5 {
            t.record_sample(sample(70.0));
        }
        t.start_experiment(
            "no-op",
            TuningParams {
                aging_factor: 2.0,
                ..TuningParams::default()
            },
        )
        .unwrap();
        for _ in 0..5 {
            t.record_sample(sample(70.2)); // ~0.3% improvement, below 2%
        }
        let outcome = t
            .experiment_tick(Instant::now() + Duration::from_secs(3601))
            .unwrap();
        assert_eq!(outcome, ExperimentOutcome::Reverted);
        assert_eq!(t.current_params().aging_factor, 1.0);
    }

    #[test]
    fn test_early_termination_rolls_back() {
        let mut t = tuner();
        for _ in 0..5 {
            t.record_sample(sample(70.0));
        }
        t.start_experiment(
            "bad",
            TuningParams {
                aging_factor: 3.0,
                ..TuningParams::default()
            },
        )
        .unwrap();
        for _ in 0..3 {
            t.record_sample(sample(55.0)); // >10% below control
        }
        let outcome = t.experiment_tick(Instant::now()).unwrap();
        assert_eq!(outcome, ExperimentOutcome::EarlyTerminated);
        assert_eq!(t.current_params().aging_factor, 1.0);
    }

    #[test]
    fn test_failure_rolls_back() {
        let mut t = tuner();
        for _ in 0..5 {
            t.record_sample(sample(70.0));
        }
        t.start_experiment(
            "crashy",
            TuningParams {
                aging_factor: 2.5,
                ..TuningParams::default()
            },
        )
        .unwrap();
        assert_eq!(t.fail_experiment(), Some(ExperimentOutcome::Failed));
        assert_eq!(t.current_params().aging_factor, 1.0);
        assert!(t.active_experiment().is_none());
    }

    #[test]
    fn test_only_one_active_experiment() {
        let mut t = tuner();
        t.record_sample(sample(70.0));
        t.start_experiment("a", TuningParams::default()).unwrap();
        assert!(matches!(
            t.start_experiment("b", TuningParams::default()),
            Err(ExperimentError::AlreadyActive)
        ));
    }

    #[test]
    fn test_recommendations_on_low_hit_rate() {
        let mut t = tuner();
        for _ in 0..5 {
            t.record_sample(MetricSample {
                hit_rate: 0.2,
                ..sample(60.0)
            });
        }
        let recs = t.recommendations();
        assert!(recs
            .iter()
            .any(|r| matches!(r, Recommendation::IncreaseAgingFactor { .. })));
    }

    #[test]
    fn test_auto_apply_respects_floors() {
        let mut t = tuner();
        for _ in 0..5 {
            // Moderately low accuracy: IncreasePrefetchDistance at
            // confidence 0.6, below the 0.7 auto-apply floor.
            t.record_sample(MetricSample {
                prefetch_accuracy: 0.5,
                ..sample(60.0)
            });
        }
        let before = t.current_params().clone();
        let applied = t.auto_apply();
        assert!(applied.is_empty());
        assert_eq!(*t.current_params(), before);
    }

    #[test]
    fn test_auto_apply_applies_confident_recommendation() {
        let mut t = tuner();
        for _ in 0..5 {
            t.record_sample(MetricSample {
                storage_efficiency: 0.3,
                ..sample(60.0)
            });
        }
        let applied = t.auto_apply();
        assert_eq!(applied.len(), 1);
        assert!(t.current_params().target_utilization < 0.8);
    }

    #[test]
    fn test_archive_is_bounded() {
        let mut cfg = TuningConfig::default();
        cfg.archive_len = 2;
        let mut t = AdaptiveTuner::new(cfg, TuningParams::default());
        for i in 0..4 {
            t.record_sample(sample(70.0));
            t.start_experiment(format!("e{i}"), TuningParams::default())
                .unwrap();
            t.fail_experiment();
        }
        assert_eq!(t.archive().count(), 2);
    }
}
