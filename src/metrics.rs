//! Prometheus metrics for the engine, exported at `/metrics`.

use prometheus::{Encoder, Gauge, IntCounter, Registry, TextEncoder};

/// Engine-wide counters and gauges.
pub struct EngineMetrics {
    registry: Registry,

    pub predictions_generated: IntCounter,
    pub requests_admitted: IntCounter,
    pub requests_rejected: IntCounter,
    pub requests_dropped: IntCounter,
    pub prefetches_completed: IntCounter,
    pub prefetch_failures: IntCounter,
    pub items_evicted: IntCounter,
    pub items_downgraded: IntCounter,
    pub health_score: Gauge,
}

impl EngineMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let predictions_generated = IntCounter::new(
            "prefetch_predictions_generated_total",
            "Predictions surviving dedup and ranking",
        )
        .expect("valid metric definition");
        let requests_admitted = IntCounter::new(
            "prefetch_requests_admitted_total",
            "Resource requests allocated",
        )
        .expect("valid metric definition");
        let requests_rejected = IntCounter::new(
            "prefetch_requests_rejected_total",
            "Resource requests rejected at submission",
        )
        .expect("valid metric definition");
        let requests_dropped = IntCounter::new(
            "prefetch_requests_dropped_total",
            "Queued requests dropped at their deadline",
        )
        .expect("valid metric definition");
        let prefetches_completed = IntCounter::new(
            "prefetch_fetches_completed_total",
            "Cache-store prefetches completed",
        )
        .expect("valid metric definition");
        let prefetch_failures = IntCounter::new(
            "prefetch_fetches_failed_total",
            "Cache-store prefetches failed",
        )
        .expect("valid metric definition");
        let items_evicted =
            IntCounter::new("prefetch_items_evicted_total", "Cache items deleted by eviction")
                .expect("valid metric definition");
        let items_downgraded = IntCounter::new(
            "prefetch_items_downgraded_total",
            "Cache items quality-downgraded by eviction",
        )
        .expect("valid metric definition");
        let health_score = Gauge::new("prefetch_health_score", "Latest overall health score")
            .expect("valid metric definition");

        for metric in [
            &predictions_generated,
            &requests_admitted,
            &requests_rejected,
            &requests_dropped,
            &prefetches_completed,
            &prefetch_failures,
            &items_evicted,
            &items_downgraded,
        ] {
            registry
                .register(Box::new(metric.clone()))
                .expect("unique metric registration");
        }
        registry
            .register(Box::new(health_score.clone()))
            .expect("unique metric registration");

        Self {
            registry,
            predictions_generated,
            requests_admitted,
            requests_rejected,
            requests_dropped,
            prefetches_completed,
            prefetch_failures,
            items_evicted,
            items_downgraded,
            health_score,
        }
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        if encoder
            .encode(&self.registry.gather(), &mut buf)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
