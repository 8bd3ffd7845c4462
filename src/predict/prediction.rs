//! Predictions: scored, time-bounded forecasts that a content unit will be
//! needed soon.
//!
//! Predictions are transient; each generation cycle produces a fresh batch
//! which is deduplicated, ranked, capped and handed to the scheduler. A
//! content key keeps at most one surviving prediction (highest priority
//! wins).

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::types::{ContentKey, Level};

/// Which heuristic produced a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredictionKind {
    Sequential,
    Behavioral,
    ChapterBoundary,
    SkipPattern,
    VocabularyAdaptation,
}

/// One prefetch forecast.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub id: Uuid,
    pub key: ContentKey,
    pub kind: PredictionKind,

    /// Priority 1 (lowest) to 100.
    pub priority: u8,

    /// Confidence in [0,1].
    pub confidence: f64,

    /// Estimated fractional resource cost in [0,1].
    pub resource_cost: f64,

    /// How soon the content is expected to be needed.
    pub time_to_need: Duration,

    /// Absolute expiry; stale predictions are dropped unranked.
    pub valid_until: Instant,

    /// Predictions that must complete before this one (sequential chains).
    pub dependencies: Vec<Uuid>,
}

impl Prediction {
    pub fn new(key: ContentKey, kind: PredictionKind, priority: u8, confidence: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            kind,
            priority,
            confidence,
            resource_cost: 0.1,
            time_to_need: Duration::from_secs(30),
            valid_until: Instant::now() + Duration::from_secs(60),
            dependencies: Vec::new(),
        }
    }

    /// Ranking score: high-priority, high-confidence, cheap predictions
    /// first.
    pub fn rank_score(&self) -> f64 {
        self.priority as f64 * self.confidence * (1.0 - self.resource_cost)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.valid_until
    }
}

/// Deduplicate by content key, keeping the highest-priority survivor.
///
/// Idempotent: running it on an already-deduplicated list is a no-op apart
/// from ordering, which [`rank`] re-establishes anyway.
pub fn dedup(predictions: Vec<Prediction>) -> Vec<Prediction> {
    let mut survivors: HashMap<(String, u32, Level, u32), Prediction> = HashMap::new();
    for p in predictions {
        match survivors.entry(p.key.dedup_key()) {
            std::collections::hash_map::Entry::Occupied(mut e) => {
                if p.priority > e.get().priority {
                    e.insert(p);
                }
            }
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(p);
            }
        }
    }
    survivors.into_values().collect()
}

/// Drop dependency edges whose target is not in the batch.
///
/// Dedup, capping and cache filtering can all remove a mid-chain
/// prediction; a surviving dependent would then wait on an id the
/// scheduler will never see, stalling its queue tier until the deadline
/// drop.
pub fn prune_dangling_dependencies(predictions: &mut [Prediction]) {
    let ids: HashSet<Uuid> = predictions.iter().map(|p| p.id).collect();
    for p in predictions.iter_mut() {
        p.dependencies.retain(|d| ids.contains(d));
    }
}

/// Drop expired predictions, rank the rest descending, cap the list.
pub fn rank(mut predictions: Vec<Prediction>, now: Instant, cap: usize) -> Vec<Prediction> {
    predictions.retain(|p| !p.is_expired(now));
    predictions.sort_by(|a, b| {
        b.rank_score()
            .partial_cmp(&a.rank_score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    predictions.truncate(cap);
    predictions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(sentence: u32, priority: u8) -> Prediction {
        Prediction::new(
            ContentKey::new("book", 0, sentence),
            PredictionKind::Sequential,
            priority,
            0.9,
        )
    }

    #[test]
    fn test_dedup_keeps_highest_priority() {
        let deduped = dedup(vec![prediction(1, 80), prediction(1, 60)]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].priority, 80);
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let once = dedup(vec![prediction(1, 80), prediction(1, 60), prediction(2, 50)]);
        let mut once_keys: Vec<_> = once.iter().map(|p| (p.key.clone(), p.priority)).collect();
        let twice = dedup(once.clone());
        let mut twice_keys: Vec<_> = twice.iter().map(|p| (p.key.clone(), p.priority)).collect();
        once_keys.sort_by(|a, b| a.0.sentence_index.cmp(&b.0.sentence_index));
        twice_keys.sort_by(|a, b| a.0.sentence_index.cmp(&b.0.sentence_index));
        assert_eq!(once_keys, twice_keys);
    }

    #[test]
    fn test_rank_orders_by_score_and_caps() {
        let mut cheap = prediction(1, 50);
        cheap.resource_cost = 0.0;
        let mut expensive = prediction(2, 50);
        expensive.resource_cost = 0.9;
        let mut top = prediction(3, 100);
        top.resource_cost = 0.0;

        let ranked = rank(vec![cheap, expensive, top], Instant::now(), 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].priority, 100);
        assert_eq!(ranked[1].key.sentence_index, 1);
    }

    #[test]
    fn test_prune_drops_dangling_dependencies() {
        let parent = prediction(1, 90);
        let mut child = prediction(2, 80);
        child.dependencies = vec![parent.id, Uuid::new_v4()];

        let parent_id = parent.id;
        let mut batch = vec![parent, child];
        prune_dangling_dependencies(&mut batch);

        // The in-batch edge survives, the dangling one is gone.
        assert_eq!(batch[1].dependencies, vec![parent_id]);
    }

    #[test]
    fn test_rank_drops_expired() {
        let now = Instant::now();
        let mut stale = prediction(1, 90);
        stale.valid_until = now - Duration::from_secs(1);
        let fresh = prediction(2, 50);

        let ranked = rank(vec![stale, fresh], now, 10);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].key.sentence_index, 2);
    }
}
