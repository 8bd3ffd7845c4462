//! Strategy selection: scores every catalog entry against the current
//! environment and resource situation, activating the best fit.
//!
//! ```text
//! satisfaction = Σ(weight of met conditions) / Σ(weights)
//! score        = satisfaction × (1 − penalty)       penalty capped at 0.8
//! ```
//!
//! Penalties punish strategies whose budget the device cannot honor right
//! now: an over-committed network budget, a storage budget that would push
//! utilization past 0.9, or a battery-hungry budget on a low battery.

use tracing::debug;

use crate::strategy::catalog::Strategy;
use crate::types::EnvSnapshot;

/// Available bandwidth is divided by this before comparing against a
/// strategy's network budget, leaving slack for foreground playback.
const BANDWIDTH_SAFETY_DIVISOR: f64 = 2.0;

/// Combined storage budget + utilization above which the storage penalty
/// applies.
const STORAGE_PRESSURE_LIMIT: f64 = 0.9;

const PENALTY_CAP: f64 = 0.8;

/// Resource facts the selector needs, extracted from the scheduler and
/// probes at selection time.
#[derive(Debug, Clone, Copy)]
pub struct ResourceOutlook {
    /// Currently available network bandwidth, normalized to [0,1].
    pub available_bandwidth: f64,

    /// Storage quota utilization in [0,1].
    pub storage_utilization: f64,

    /// Battery charge level in [0,1].
    pub battery_level: f64,
}

/// A scored catalog entry.
#[derive(Debug, Clone)]
pub struct StrategyScore {
    pub index: usize,
    pub name: String,
    pub satisfaction: f64,
    pub penalty: f64,
    pub score: f64,
}

/// Score a single strategy. The result is always in [0,1].
pub fn score_strategy(strategy: &Strategy, env: &EnvSnapshot, outlook: &ResourceOutlook) -> f64 {
    let (satisfaction, penalty) = score_parts(strategy, env, outlook);
    satisfaction * (1.0 - penalty)
}

fn score_parts(strategy: &Strategy, env: &EnvSnapshot, outlook: &ResourceOutlook) -> (f64, f64) {
    let total_weight: f64 = strategy.conditions.iter().map(|c| c.weight()).sum();
    let satisfaction = if total_weight > 0.0 {
        let met: f64 = strategy
            .conditions
            .iter()
            .filter(|c| c.is_met(env))
            .map(|c| c.weight())
            .sum();
        met / total_weight
    } else {
        // A strategy with no conditions is always a neutral fit.
        0.5
    };

    (satisfaction, resource_penalty(strategy, outlook))
}

fn resource_penalty(strategy: &Strategy, outlook: &ResourceOutlook) -> f64 {
    let mut penalty: f64 = 0.0;

    if strategy.budget.network > outlook.available_bandwidth / BANDWIDTH_SAFETY_DIVISOR {
        penalty += 0.3;
    }
    if strategy.budget.storage + outlook.storage_utilization > STORAGE_PRESSURE_LIMIT {
        penalty += 0.4;
    }
    if strategy.budget.battery > 0.5 && outlook.battery_level < 0.3 {
        penalty += 0.5;
    }

    penalty.min(PENALTY_CAP)
}

/// Select the best-fitting strategy from the catalog.
///
/// Deterministic for a fixed environment and outlook: the maximum score
/// wins and ties are broken by catalog order.
pub fn select_strategy(
    catalog: &[Strategy],
    env: &EnvSnapshot,
    outlook: &ResourceOutlook,
) -> Option<StrategyScore> {
    let mut best: Option<StrategyScore> = None;

    for (index, strategy) in catalog.iter().enumerate() {
        let (satisfaction, penalty) = score_parts(strategy, env, outlook);
        let score = satisfaction * (1.0 - penalty);

        debug!(
            strategy = %strategy.name,
            satisfaction,
            penalty,
            score,
            "Scored strategy"
        );

        // Strictly-greater keeps the earliest catalog entry on ties.
        if best.as_ref().map_or(true, |b| score > b.score) {
            best = Some(StrategyScore {
                index,
                name: strategy.name.clone(),
                satisfaction,
                penalty,
                score,
            });
        }
    }

    best
}
