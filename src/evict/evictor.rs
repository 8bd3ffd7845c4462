//! Scored eviction passes.
//!
//! Each pass enumerates the live cache store, scores every item with a
//! weighted multi-component function (higher = more expendable), and walks
//! the candidates in score order, downgrading quality where the policy
//! allows it and deleting otherwise, until the reclaim target is met.

use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::evict::policy::EvictionPolicy;
use crate::providers::{CacheStore, CachedItemMeta, StoreError};
use crate::types::{ContentKey, NetworkClass, PriorityTier, Quality};

const SECS_PER_DAY: f64 = 86_400.0;

/// Age contribution saturates at 30 days.
const AGE_CAP_DAYS: f64 = 30.0;

/// Recency contribution saturates at 7 days since last access.
const RECENCY_CAP_DAYS: f64 = 7.0;

/// Ceiling on the behavior sub-component.
const BEHAVIOR_CAP: f64 = 0.3;

/// A cached item with its computed eviction score.
#[derive(Debug, Clone)]
pub struct EvictionCandidate {
    pub key: ContentKey,
    pub tier: PriorityTier,
    pub quality: Quality,
    pub size_bytes: u64,
    pub access_count: u64,

    /// Composite score in [0,1]; higher = evict first.
    pub score: f64,

    /// Whether a lower-fidelity rendition exists to downgrade to.
    pub can_downgrade: bool,
}

/// Session signals the scorer folds into the behavior component.
#[derive(Debug, Clone, Copy)]
pub struct EvictionContext {
    pub now: SystemTime,
    pub network_class: NetworkClass,

    /// Session skip rate in [0,1].
    pub skip_rate: f64,
}

/// Outcome of one eviction pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct EvictionReport {
    /// Whether the pass ran at all (size above trigger).
    pub triggered: bool,
    pub examined: usize,
    pub deleted: usize,
    pub downgraded: usize,
    pub bytes_reclaimed: u64,
}

/// The eviction engine.
pub struct Evictor;

impl Evictor {
    /// Compute the eviction score for one item. Always in [0,1].
    pub fn score(meta: &CachedItemMeta, policy: &EvictionPolicy, ctx: &EvictionContext) -> f64 {
        let w = &policy.weights;

        // Lower-priority tiers score higher.
        let priority = meta.tier.eviction_pressure() * w.priority;

        let age_days = ctx
            .now
            .duration_since(meta.created_at)
            .map(|d| d.as_secs_f64() / SECS_PER_DAY)
            .unwrap_or(0.0);
        let age = ((age_days * policy.aging_factor) / AGE_CAP_DAYS).min(1.0) * w.age;

        // Rarely-accessed items are expendable; the dampening keeps a few
        // extra plays from rescuing an item forever.
        let access_damp = ((1.0 + meta.access_count as f64).ln() / (1.0 + 100.0f64).ln()).min(1.0);
        let access = (1.0 - access_damp) * w.access;

        let idle_days = ctx
            .now
            .duration_since(meta.last_accessed)
            .map(|d| d.as_secs_f64() / SECS_PER_DAY)
            .unwrap_or(0.0);
        let recency = (idle_days / RECENCY_CAP_DAYS).min(1.0) * w.recency;

        // Items above the network's ideal quality are oversized for the
        // current conditions.
        let ideal = ctx.network_class.ideal_quality();
        let quality_mismatch = match (meta.quality, ideal) {
            (q, i) if q > i => {
                if q == Quality::High && i == Quality::Low {
                    1.0
                } else {
                    0.5
                }
            }
            _ => 0.0,
        } * w.quality;

        let size = (meta.size_bytes as f64 / policy.size_cap_bytes.max(1) as f64).min(1.0) * w.size;

        // Skip-heavy sessions make speculative items likely dead weight.
        let behavior_raw = if meta.tier == PriorityTier::Pregenerated {
            (ctx.skip_rate * 1.5).min(1.0)
        } else {
            ctx.skip_rate * 0.5
        };
        let behavior = (behavior_raw * w.behavior).min(BEHAVIOR_CAP);

        (priority + age + access + recency + quality_mismatch + size + behavior).clamp(0.0, 1.0)
    }

    /// Score and sort the full candidate list, most expendable first.
    pub fn candidates(
        items: &[CachedItemMeta],
        policy: &EvictionPolicy,
        ctx: &EvictionContext,
    ) -> Vec<EvictionCandidate> {
        let mut out: Vec<EvictionCandidate> = items
            .iter()
            .map(|meta| EvictionCandidate {
                key: meta.key.clone(),
                tier: meta.tier,
                quality: meta.quality,
                size_bytes: meta.size_bytes,
                access_count: meta.access_count,
                score: Self::score(meta, policy, ctx),
                can_downgrade: meta.quality.downgrade().is_some(),
            })
            .collect();
        out.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        out
    }

    /// Run one eviction pass.
    ///
    /// Returns `Err` only when store enumeration fails; that aborts the
    /// pass and the caller retries on its next cycle. Failures on
    /// individual deletes are logged and skipped.
    pub async fn run_pass(
        store: &dyn CacheStore,
        policy: &EvictionPolicy,
        ctx: &EvictionContext,
    ) -> Result<EvictionReport, StoreError> {
        let stats = store.stats().await?;
        let trigger = policy.trigger_bytes();
        if stats.total_size <= trigger {
            return Ok(EvictionReport::default());
        }
        let target_reclaim = stats.total_size - trigger;

        let items = store.list().await?;
        let candidates = Self::candidates(&items, policy, ctx);

        let mut report = EvictionReport {
            triggered: true,
            examined: candidates.len(),
            ..EvictionReport::default()
        };

        for candidate in candidates {
            if report.bytes_reclaimed >= target_reclaim {
                break;
            }

            // Prefer a quality downgrade over outright deletion when the
            // saving is worth the churn.
            if policy.allow_downgrade && candidate.can_downgrade {
                if let Some(lower) = candidate.quality.downgrade() {
                    let estimated_savings = candidate.size_bytes as f64
                        * (1.0 - lower.size_ratio() / candidate.quality.size_ratio());
                    if estimated_savings
                        > candidate.size_bytes as f64 * policy.min_downgrade_savings
                    {
                        match store.downgrade(&candidate.key, lower).await {
                            Ok(new_size) => {
                                let saved = candidate.size_bytes.saturating_sub(new_size);
                                report.downgraded += 1;
                                report.bytes_reclaimed += saved;
                                debug!(key = %candidate.key, %lower, saved, "Downgraded item");
                                continue;
                            }
                            Err(e) => {
                                warn!(key = %candidate.key, error = %e, "Downgrade failed, deleting instead");
                            }
                        }
                    }
                }
            }

            match store.delete(&candidate.key).await {
                Ok(true) => {
                    report.deleted += 1;
                    report.bytes_reclaimed += candidate.size_bytes;
                    debug!(key = %candidate.key, score = candidate.score, "Evicted item");
                }
                Ok(false) => {}
                Err(e) => warn!(key = %candidate.key, error = %e, "Delete failed"),
            }
        }

        info!(
            examined = report.examined,
            deleted = report.deleted,
            downgraded = report.downgraded,
            reclaimed = report.bytes_reclaimed,
            target = target_reclaim,
            "Eviction pass complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvictionConfig;
    use std::time::Duration;

    fn meta(
        sentence: u32,
        tier: PriorityTier,
        age_days: u64,
        size: u64,
        quality: Quality,
    ) -> CachedItemMeta {
        let now = SystemTime::now();
        let created = now - Duration::from_secs(age_days * 86_400);
        CachedItemMeta {
            key: ContentKey::new("book", 0, sentence),
            size_bytes: size,
            quality,
            tier,
            created_at: created,
            last_accessed: created,
            access_count: 0,
        }
    }

    fn ctx() -> EvictionContext {
        EvictionContext {
            now: SystemTime::now(),
            network_class: NetworkClass::Wifi,
            skip_rate: 0.0,
        }
    }

    fn policy() -> EvictionPolicy {
        EvictionPolicy::for_network(&EvictionConfig::default(), NetworkClass::Wifi)
    }

    #[test]
    fn test_score_bounds() {
        let p = policy();
        let c = ctx();
        for tier in [
            PriorityTier::CurrentBook,
            PriorityTier::Favorite,
            PriorityTier::Recent,
            PriorityTier::Pregenerated,
        ] {
            for age in [0, 1, 40, 400] {
                let m = meta(0, tier, age, 50 * 1024 * 1024, Quality::High);
                let score = Evictor::score(&m, &p, &c);
                assert!((0.0..=1.0).contains(&score), "score {score} out of bounds");
            }
        }
    }

    #[test]
    fn test_stale_pregenerated_beats_fresh_current_book() {
        let p = policy();
        let c = ctx();
        // Item A: pregenerated, 40 days old. Item B: current book, 1 day.
        let a = meta(1, PriorityTier::Pregenerated, 40, 5 * 1024 * 1024, Quality::High);
        let b = meta(2, PriorityTier::CurrentBook, 1, 5 * 1024 * 1024, Quality::High);

        assert!(Evictor::score(&a, &p, &c) > Evictor::score(&b, &p, &c));

        let ordered = Evictor::candidates(&[b, a], &p, &c);
        assert_eq!(ordered[0].key.sentence_index, 1);
    }

    #[test]
    fn test_quality_mismatch_on_slow_network() {
        let config = EvictionConfig::default();
        let slow_policy = EvictionPolicy::for_network(&config, NetworkClass::TwoG);
        let slow_ctx = EvictionContext {
            network_class: NetworkClass::TwoG,
            ..ctx()
        };

        let high = meta(1, PriorityTier::Recent, 1, 1024, Quality::High);
        let low = meta(2, PriorityTier::Recent, 1, 1024, Quality::Low);
        assert!(
            Evictor::score(&high, &slow_policy, &slow_ctx)
                > Evictor::score(&low, &slow_policy, &slow_ctx)
        );
    }

    #[test]
    fn test_access_count_protects() {
        let p = policy();
        let c = ctx();
        let mut hot = meta(1, PriorityTier::Recent, 10, 1024, Quality::Medium);
        hot.access_count = 50;
        hot.last_accessed = SystemTime::now();
        let cold = meta(2, PriorityTier::Recent, 10, 1024, Quality::Medium);

        assert!(Evictor::score(&cold, &p, &c) > Evictor::score(&hot, &p, &c));
    }

    #[test]
    fn test_behavior_component_capped() {
        let config = EvictionConfig {
            behavior_weight: 1.0,
            priority_weight: 0.0,
            age_weight: 0.0,
            access_weight: 0.0,
            recency_weight: 0.0,
            quality_weight: 0.0,
            size_weight: 0.0,
            ..EvictionConfig::default()
        };
        let p = EvictionPolicy::for_network(&config, NetworkClass::Wifi);
        let c = EvictionContext {
            skip_rate: 1.0,
            ..ctx()
        };
        let m = meta(1, PriorityTier::Pregenerated, 0, 1024, Quality::High);
        // Even with the full weight on behavior, the component stays capped.
        assert!(Evictor::score(&m, &p, &c) <= BEHAVIOR_CAP + 1e-9);
    }
}
