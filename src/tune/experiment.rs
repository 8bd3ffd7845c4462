//! Timed A/B experiments over the tuning parameters.
//!
//! An experiment snapshots a control baseline from the trailing metric
//! history, applies a candidate parameter set, and samples the same metric
//! while the variant runs. It ends by adoption (improvement above the
//! significance threshold with enough samples), reversion, early
//! termination (variant clearly losing), or error; on error the
//! pre-experiment parameters are restored rather than left in place.

use std::time::{Duration, Instant};

use thiserror::Error;
use uuid::Uuid;

use crate::tune::params::TuningParams;

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("an experiment is already active")]
    AlreadyActive,

    #[error("control baseline is empty")]
    NoBaseline,
}

/// Why an experiment ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentOutcome {
    /// Variant adopted: improvement exceeded the significance threshold.
    Adopted,
    /// Variant reverted: improvement insufficient.
    Reverted,
    /// Variant reverted early: it was clearly losing.
    EarlyTerminated,
    /// Execution error; parameters rolled back.
    Failed,
}

/// A single A/B experiment.
#[derive(Debug, Clone)]
pub struct Experiment {
    pub id: Uuid,
    pub name: String,

    /// Parameters in force before the experiment, for reversion.
    pub control_params: TuningParams,
    pub variant_params: TuningParams,

    /// Trailing metric average observed under the control parameters.
    pub control_baseline: f64,
    pub control_samples: usize,

    /// Metric samples collected while the variant runs.
    pub samples: Vec<(Instant, f64)>,

    pub started_at: Instant,
    pub duration: Duration,
    pub is_active: bool,

    /// Minimum fractional improvement required to adopt the variant.
    pub significance: f64,

    pub outcome: Option<ExperimentOutcome>,
}

impl Experiment {
    pub fn start(
        name: impl Into<String>,
        control_params: TuningParams,
        variant_params: TuningParams,
        control_history: &[f64],
        duration: Duration,
        significance: f64,
    ) -> Result<Self, ExperimentError> {
        if control_history.is_empty() {
            return Err(ExperimentError::NoBaseline);
        }
        let control_baseline =
            control_history.iter().sum::<f64>() / control_history.len() as f64;
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            control_params,
            variant_params,
            control_baseline,
            control_samples: control_history.len(),
            samples: Vec::new(),
            started_at: Instant::now(),
            duration,
            is_active: true,
            significance,
            outcome: None,
        })
    }

    pub fn record_sample(&mut self, at: Instant, value: f64) {
        if self.is_active {
            self.samples.push((at, value));
        }
    }

    /// Average of the trailing `n` variant samples.
    pub fn variant_average(&self, n: usize) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let tail: Vec<f64> = self
            .samples
            .iter()
            .rev()
            .take(n)
            .map(|(_, v)| *v)
            .collect();
        Some(tail.iter().sum::<f64>() / tail.len() as f64)
    }

    /// Fractional improvement of the variant over the control baseline.
    pub fn improvement(&self, trailing: usize) -> Option<f64> {
        let variant = self.variant_average(trailing)?;
        if self.control_baseline.abs() < 1e-12 {
            return None;
        }
        Some((variant - self.control_baseline) / self.control_baseline)
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    /// Whether the variant is trailing the control badly enough to stop
    /// early.
    pub fn should_terminate_early(&self, trailing: usize, drop_fraction: f64) -> bool {
        match self.improvement(trailing) {
            Some(improvement) => improvement < -drop_fraction,
            None => false,
        }
    }

    /// Decide the outcome at evaluation time. Does not mutate; the caller
    /// applies the resulting parameter choice.
    pub fn evaluate(&self, trailing: usize, min_samples: usize) -> ExperimentOutcome {
        if self.samples.len() < min_samples {
            return ExperimentOutcome::Reverted;
        }
        match self.improvement(trailing) {
            Some(improvement) if improvement > self.significance => ExperimentOutcome::Adopted,
            _ => ExperimentOutcome::Reverted,
        }
    }

    pub fn finish(&mut self, outcome: ExperimentOutcome) {
        self.is_active = false;
        self.outcome = Some(outcome);
    }
}
