//! The prediction generator: runs the active strategy's enabled layers
//! against the current session and emits a deduplicated, ranked batch of
//! predictions.
//!
//! Layer heuristics:
//! 1. Sequential: read-ahead chain, depth scaled by available bandwidth
//! 2. Behavioral: matched analytics patterns above a confidence floor
//! 3. Chapter boundary: next-chapter start when near the end of a chapter
//! 4. Skip pattern: stride jumps for users who skip frequently
//! 5. Vocabulary adaptation: original-level variant for simplified readers

use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::PredictionConfig;
use crate::predict::prediction::{dedup, rank, Prediction, PredictionKind};
use crate::providers::{BehaviorPattern, SessionStats};
use crate::strategy::catalog::{Layer, LayerKind, Strategy};
use crate::types::{ContentKey, Level, PlaybackPosition};

/// Everything a generation cycle needs, gathered outside any lock.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub stats: SessionStats,
    pub patterns: Vec<BehaviorPattern>,

    /// Usable downlink estimate in Mbit/s (class estimate scaled by the
    /// scheduler's free bandwidth fraction).
    pub available_bandwidth_mbps: f64,

    pub now: Instant,
}

/// The prediction generator.
pub struct PredictionGenerator {
    config: PredictionConfig,
}

impl PredictionGenerator {
    pub fn new(config: PredictionConfig) -> Self {
        Self { config }
    }

    /// Run one generation cycle for the active strategy.
    ///
    /// The returned batch is deduplicated (highest priority per content
    /// key), ranked by `priority × confidence × (1 − cost)`, and capped.
    pub fn generate(&self, strategy: &Strategy, ctx: &GenerationContext) -> Vec<Prediction> {
        let mut batch = Vec::new();

        for layer in strategy.enabled_layers() {
            let emitted = match layer.kind {
                LayerKind::Sequential => self.sequential(layer, ctx),
                LayerKind::Behavioral => self.behavioral(layer, ctx),
                LayerKind::ChapterBoundary => self.chapter_boundary(layer, ctx),
                LayerKind::SkipPattern => self.skip_pattern(layer, ctx),
                LayerKind::VocabularyAdaptation => self.vocabulary(layer, ctx),
            };
            batch.extend(emitted);
        }

        let total = batch.len();
        let batch = rank(dedup(batch), ctx.now, self.config.max_predictions);
        debug!(
            emitted = total,
            survived = batch.len(),
            strategy = %strategy.name,
            "Generation cycle complete"
        );
        batch
    }

    /// Read-ahead chain from the current position. Each prediction depends
    /// on the previous offset so fetches land in playback order.
    fn sequential(&self, layer: &Layer, ctx: &GenerationContext) -> Vec<Prediction> {
        let depth = ((ctx.available_bandwidth_mbps * 4.0).floor() as usize)
            .min(self.config.max_sequential_depth);

        let mut out = Vec::with_capacity(depth);
        let mut previous: Option<uuid::Uuid> = None;

        for offset in 1..=depth as u32 {
            let key = match offset_key(&ctx.stats.position, offset) {
                Some(k) => k,
                None => break,
            };
            let priority = (100i32 - 4 * offset as i32).clamp(1, 100) as u8;
            let confidence = (layer.confidence - 0.03 * offset as f64).max(0.0);

            let mut p = Prediction::new(key, PredictionKind::Sequential, priority, confidence);
            p.resource_cost = self.cost_for(layer);
            p.time_to_need = time_to_reach(offset, ctx.stats.reading_speed);
            p.valid_until = ctx.now + self.valid_for();
            if let Some(prev) = previous {
                p.dependencies.push(prev);
            }
            previous = Some(p.id);
            out.push(p);
        }
        out
    }

    fn behavioral(&self, layer: &Layer, ctx: &GenerationContext) -> Vec<Prediction> {
        ctx.patterns
            .iter()
            .filter(|p| p.confidence >= self.config.min_pattern_confidence)
            .filter_map(|pattern| {
                let key = offset_key(&ctx.stats.position, pattern.suggested_offset)?;
                let priority = ((90.0 * pattern.confidence) as u8).clamp(1, 100);
                let mut p = Prediction::new(
                    key,
                    PredictionKind::Behavioral,
                    priority,
                    pattern.confidence * layer.confidence,
                );
                p.resource_cost = self.cost_for(layer);
                p.time_to_need = time_to_reach(pattern.suggested_offset, ctx.stats.reading_speed);
                p.valid_until = ctx.now + self.valid_for();
                Some(p)
            })
            .collect()
    }

    /// One prediction for the start of the next chapter once the reader is
    /// past the boundary fraction of the current one.
    fn chapter_boundary(&self, layer: &Layer, ctx: &GenerationContext) -> Vec<Prediction> {
        let pos = &ctx.stats.position;
        if pos.chunk_length == 0 {
            return Vec::new();
        }
        let progress = pos.sentence_index as f64 / pos.chunk_length as f64;
        if progress < self.config.chapter_boundary_fraction {
            return Vec::new();
        }

        let key = ContentKey {
            book_id: pos.book_id.clone(),
            chunk_index: pos.chunk_index + 1,
            level: pos.level,
            voice: "default".to_string(),
            sentence_index: 0,
        };
        let mut p = Prediction::new(key, PredictionKind::ChapterBoundary, 75, layer.confidence);
        p.resource_cost = self.cost_for(layer);
        p.valid_until = ctx.now + self.valid_for();
        vec![p]
    }

    /// Stride-ahead predictions for skip-heavy sessions. The stride grows
    /// with the skip rate: a reader skipping half the sentences lands
    /// roughly every second sentence.
    fn skip_pattern(&self, layer: &Layer, ctx: &GenerationContext) -> Vec<Prediction> {
        let skip_rate = ctx.stats.skip_rate;
        if skip_rate <= self.config.skip_rate_threshold {
            return Vec::new();
        }

        let stride = (1.0 / (1.0 - skip_rate.min(0.95))).ceil() as u32;
        let priority = ((80.0 * skip_rate) as u8).clamp(1, 100);

        (1..=3u32)
            .filter_map(|k| {
                let key = offset_key(&ctx.stats.position, stride * k)?;
                let mut p = Prediction::new(
                    key,
                    PredictionKind::SkipPattern,
                    priority,
                    layer.confidence * skip_rate,
                );
                p.resource_cost = self.cost_for(layer);
                p.time_to_need = time_to_reach(stride * k, ctx.stats.reading_speed);
                p.valid_until = ctx.now + self.valid_for();
                Some(p)
            })
            .collect()
    }

    /// When reading simplified text, keep the original-level version of the
    /// current position warm for a quick level switch.
    fn vocabulary(&self, layer: &Layer, ctx: &GenerationContext) -> Vec<Prediction> {
        let pos = &ctx.stats.position;
        if pos.level != Level::Simplified {
            return Vec::new();
        }

        let key = ContentKey {
            book_id: pos.book_id.clone(),
            chunk_index: pos.chunk_index,
            level: Level::Original,
            voice: "default".to_string(),
            sentence_index: pos.sentence_index,
        };
        let mut p = Prediction::new(key, PredictionKind::VocabularyAdaptation, 20, layer.confidence);
        p.resource_cost = self.cost_for(layer);
        p.valid_until = ctx.now + self.valid_for();
        vec![p]
    }

    fn cost_for(&self, layer: &Layer) -> f64 {
        (layer.resource_weight * 0.25).clamp(0.02, 0.5)
    }

    fn valid_for(&self) -> Duration {
        Duration::from_secs(self.config.valid_for_secs)
    }
}

/// Content key `offset` sentences ahead of the position, rolling into
/// subsequent chunks. Returns None only when the chunk length is unknown
/// and the offset would leave the current chunk.
fn offset_key(pos: &PlaybackPosition, offset: u32) -> Option<ContentKey> {
    let (chunk, sentence) = if pos.chunk_length > 0 {
        let absolute = pos.sentence_index + offset;
        (
            pos.chunk_index + absolute / pos.chunk_length,
            absolute % pos.chunk_length,
        )
    } else {
        (pos.chunk_index, pos.sentence_index.checked_add(offset)?)
    };

    Some(ContentKey {
        book_id: pos.book_id.clone(),
        chunk_index: chunk,
        level: pos.level,
        voice: "default".to_string(),
        sentence_index: sentence,
    })
}

/// Estimated time until the reader reaches a sentence `offset` ahead.
fn time_to_reach(offset: u32, reading_speed: f64) -> Duration {
    if reading_speed <= 0.0 {
        return Duration::from_secs(60);
    }
    Duration::from_secs_f64(offset as f64 * 60.0 / reading_speed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::catalog::builtin_catalog;

    fn position() -> PlaybackPosition {
        PlaybackPosition {
            book_id: "book".to_string(),
            chunk_index: 2,
            sentence_index: 10,
            chunk_length: 40,
            level: Level::Original,
        }
    }

    fn context() -> GenerationContext {
        GenerationContext {
            stats: SessionStats {
                position: position(),
                reading_speed: 150.0,
                skip_rate: 0.0,
                hit_rate: 0.8,
                avg_load_time_ms: 200.0,
            },
            patterns: Vec::new(),
            available_bandwidth_mbps: 10.0,
            now: Instant::now(),
        }
    }

    fn generator() -> PredictionGenerator {
        PredictionGenerator::new(PredictionConfig::default())
    }

    fn wifi_strategy() -> Strategy {
        builtin_catalog()
            .into_iter()
            .find(|s| s.name == "aggressive-wifi")
            .unwrap()
    }

    #[test]
    fn test_sequential_depth_tracks_bandwidth() {
        let g = generator();
        let strategy = wifi_strategy();

        let mut ctx = context();
        ctx.available_bandwidth_mbps = 1.0; // depth 4
        let batch = g.generate(&strategy, &ctx);
        let sequential = batch
            .iter()
            .filter(|p| p.kind == PredictionKind::Sequential)
            .count();
        assert_eq!(sequential, 4);

        ctx.available_bandwidth_mbps = 50.0; // capped at 20
        let batch = g.generate(&strategy, &ctx);
        let sequential = batch
            .iter()
            .filter(|p| p.kind == PredictionKind::Sequential)
            .count();
        assert_eq!(sequential, 20);
    }

    #[test]
    fn test_sequential_chain_dependencies() {
        let g = generator();
        let strategy = wifi_strategy();
        let mut ctx = context();
        ctx.available_bandwidth_mbps = 1.0;

        let layer = strategy
            .layers
            .iter()
            .find(|l| l.kind == LayerKind::Sequential)
            .unwrap();
        let chain = g.sequential(layer, &ctx);
        assert!(chain[0].dependencies.is_empty());
        for pair in chain.windows(2) {
            assert_eq!(pair[1].dependencies, vec![pair[0].id]);
        }
        // Priority decays ~4 per offset.
        assert_eq!(chain[0].priority, 96);
        assert_eq!(chain[1].priority, 92);
    }

    #[test]
    fn test_behavioral_respects_confidence_floor() {
        let g = generator();
        let strategy = wifi_strategy();
        let mut ctx = context();
        ctx.available_bandwidth_mbps = 0.0; // silence the sequential layer
        ctx.patterns = vec![
            BehaviorPattern {
                confidence: 0.9,
                suggested_offset: 5,
                tag: "binge".to_string(),
            },
            BehaviorPattern {
                confidence: 0.4,
                suggested_offset: 9,
                tag: "weak".to_string(),
            },
        ];

        let batch = g.generate(&strategy, &ctx);
        let behavioral: Vec<_> = batch
            .iter()
            .filter(|p| p.kind == PredictionKind::Behavioral)
            .collect();
        assert_eq!(behavioral.len(), 1);
        assert_eq!(behavioral[0].priority, 81); // 90 × 0.9
    }

    #[test]
    fn test_chapter_boundary_fires_past_80_percent() {
        let g = generator();
        let strategy = wifi_strategy();
        let mut ctx = context();
        ctx.available_bandwidth_mbps = 0.0;
        ctx.stats.position.sentence_index = 35; // 35/40 = 87.5%

        let batch = g.generate(&strategy, &ctx);
        let boundary: Vec<_> = batch
            .iter()
            .filter(|p| p.kind == PredictionKind::ChapterBoundary)
            .collect();
        assert_eq!(boundary.len(), 1);
        assert_eq!(boundary[0].key.chunk_index, 3);
        assert_eq!(boundary[0].key.sentence_index, 0);
        assert_eq!(boundary[0].priority, 75);
    }

    #[test]
    fn test_skip_pattern_stride() {
        let g = generator();
        let strategy = wifi_strategy();
        let mut ctx = context();
        ctx.available_bandwidth_mbps = 0.0;
        ctx.stats.skip_rate = 0.5; // stride = ceil(1/0.5) = 2

        let batch = g.generate(&strategy, &ctx);
        let mut offsets: Vec<u32> = batch
            .iter()
            .filter(|p| p.kind == PredictionKind::SkipPattern)
            .map(|p| p.key.sentence_index - 10)
            .collect();
        offsets.sort();
        assert_eq!(offsets, vec![2, 4, 6]);
    }

    #[test]
    fn test_vocabulary_layer_for_simplified_reader() {
        let g = generator();
        let strategy = wifi_strategy();
        let mut ctx = context();
        ctx.available_bandwidth_mbps = 0.0;
        ctx.stats.position.level = Level::Simplified;

        let batch = g.generate(&strategy, &ctx);
        let vocab: Vec<_> = batch
            .iter()
            .filter(|p| p.kind == PredictionKind::VocabularyAdaptation)
            .collect();
        assert_eq!(vocab.len(), 1);
        assert_eq!(vocab[0].key.level, Level::Original);
        assert_eq!(vocab[0].key.sentence_index, 10);
    }

    #[test]
    fn test_batch_respects_cap() {
        let mut config = PredictionConfig::default();
        config.max_predictions = 5;
        let g = PredictionGenerator::new(config);
        let strategy = wifi_strategy();
        let ctx = context();

        let batch = g.generate(&strategy, &ctx);
        assert!(batch.len() <= 5);
    }

    #[test]
    fn test_chunk_rollover() {
        let pos = PlaybackPosition {
            sentence_index: 38,
            ..position()
        };
        let key = offset_key(&pos, 5).unwrap();
        assert_eq!(key.chunk_index, 3);
        assert_eq!(key.sentence_index, 3);
    }
}
