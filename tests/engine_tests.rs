//! Integration tests for the engine against the in-memory providers.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use adaptive_prefetch::config::Config;
use adaptive_prefetch::engine::{EngineError, PrefetchEngine, Providers};
use adaptive_prefetch::providers::memory::{
    sim_position, MemoryCacheStore, ScriptedAnalytics, StaticDeviceProbe, StaticNetworkInfo,
};
use adaptive_prefetch::providers::CacheStore;
use adaptive_prefetch::tune::params::TuningParams;
use adaptive_prefetch::types::{ContentKey, NetworkClass, Quality};

fn build_engine(store: Arc<MemoryCacheStore>) -> Arc<PrefetchEngine> {
    let providers = Providers {
        store,
        network: Arc::new(StaticNetworkInfo::new(
            NetworkClass::Wifi,
            Duration::from_millis(40),
        )),
        device: Arc::new(StaticDeviceProbe::new(0, 4 << 30, 0.9)),
        analytics: Arc::new(ScriptedAnalytics::new(sim_position())),
    };
    PrefetchEngine::new(Arc::new(Config::default()), providers)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_started_engine_prefetches_and_reports_health() {
    let store = Arc::new(MemoryCacheStore::new());
    let engine = build_engine(store.clone());

    // Every loop's first interval tick fires immediately: one prediction
    // cycle, one metrics cycle and one health check run right away.
    engine.start();
    tokio::time::sleep(Duration::from_millis(300)).await;
    engine.stop();

    let status = engine.status().await;
    assert!(status.predictions_generated > 0);
    assert_eq!(status.active_strategy, "aggressive-wifi");

    assert!(store.stats().await.unwrap().item_count > 0);
    assert!(engine.health().await.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_experiment_queueable_once_samples_exist() {
    let engine = build_engine(Arc::new(MemoryCacheStore::new()));

    // No metric history yet: an experiment has no control baseline.
    let early = engine
        .queue_experiment("too-early", TuningParams::default())
        .await;
    assert!(matches!(early, Err(EngineError::Experiment(_))));

    engine.start();
    tokio::time::sleep(Duration::from_millis(300)).await;
    engine.stop();

    let variant = TuningParams {
        aging_factor: 1.5,
        ..TuningParams::default()
    };
    engine.queue_experiment("aging-up", variant).await.unwrap();

    let experiments = engine.experiments().await;
    assert_eq!(experiments.len(), 1);
    assert!(experiments[0].is_active);

    // Only one experiment may run at a time.
    assert!(matches!(
        engine
            .queue_experiment("second", TuningParams::default())
            .await,
        Err(EngineError::Experiment(_))
    ));
}

#[tokio::test]
async fn test_forced_strategy_survives_status() {
    let engine = build_engine(Arc::new(MemoryCacheStore::new()));

    engine.force_strategy("minimal-degraded").await.unwrap();
    assert_eq!(engine.status().await.active_strategy, "minimal-degraded");

    assert!(matches!(
        engine.force_strategy("does-not-exist").await,
        Err(EngineError::UnknownStrategy(_))
    ));
}

#[tokio::test]
async fn test_engine_eviction_respects_quota() {
    let store = Arc::new(MemoryCacheStore::new());
    let engine = build_engine(store.clone());

    // 120 MB of speculative items against the 100 MB default quota.
    for i in 0..240 {
        store
            .prefetch(&ContentKey::new("backlog", i / 40, i % 40), Quality::High)
            .await
            .unwrap();
    }

    let report = engine.maybe_evict().await.unwrap();
    assert!(report.triggered);

    let stats = store.stats().await.unwrap();
    assert!(stats.total_size < 120 * 1024 * 1024);
}

#[test]
fn test_config_loads_from_json_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let mut config = Config::default();
    config.scheduler.tick_secs = 7;
    config.eviction.max_cache_bytes = 42 * 1024 * 1024;
    write!(file, "{}", serde_json::to_string(&config).unwrap()).unwrap();

    let loaded = Config::load(file.path()).unwrap();
    assert_eq!(loaded.scheduler.tick_secs, 7);
    assert_eq!(loaded.eviction.max_cache_bytes, 42 * 1024 * 1024);
}
