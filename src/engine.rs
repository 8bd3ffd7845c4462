//! The prefetch engine: owns every component behind explicit locks and
//! drives them from independent periodic loops.
//!
//! Loop layout (periods from config):
//! - prediction generation (~5s): strategy fit check, layer heuristics,
//!   submission to the scheduler
//! - scheduler tick (~2s): queue draining, deadline drops, stale reclaim
//! - metrics collection (~30s): health inputs, tuner samples, eviction
//!   trigger
//! - experiment sampling (~1min): experiment progression
//! - tuning analysis (~5min): recommendations and auto-apply
//! - health check (~15min): snapshot logging and alert broadcast
//! - deep analysis (~2h): unconditional eviction audit and adaptive layer
//!   scaling
//!
//! No lock is held across store I/O: admission happens under the scheduler
//! lock, the fetch runs in a spawned task, and completion is signaled back
//! through `complete_allocation`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use thiserror::Error;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::evict::evictor::{EvictionContext, EvictionReport, Evictor};
use crate::evict::policy::EvictionPolicy;
use crate::health::monitor::{Alert, HealthInputs, HealthMonitor, HealthSnapshot};
use crate::metrics::EngineMetrics;
use crate::predict::generator::{GenerationContext, PredictionGenerator};
use crate::predict::prediction::{prune_dangling_dependencies, Prediction, PredictionKind};
use crate::providers::{
    BehaviorAnalytics, CacheStore, CachedItemMeta, DeviceProbe, NetworkInfo, SessionStats,
};
use crate::sched::quota::ResourceQuota;
use crate::sched::scheduler::{Admission, ResourceRequest, ResourceScheduler, SchedulerError};
use crate::strategy::catalog::{builtin_catalog, Strategy};
use crate::strategy::selector::{score_strategy, select_strategy, ResourceOutlook};
use crate::tune::experiment::{Experiment, ExperimentError};
use crate::tune::params::TuningParams;
use crate::tune::tuner::{AdaptiveTuner, MetricSample};
use crate::types::{ContentKey, EnvSnapshot, NetworkClass, Quality};

/// Active-strategy fit below which re-selection is triggered.
const DEGRADED_FIT: f64 = 0.5;

/// Peak downlink assumed for a WiFi-class connection, in Mbit/s.
const WIFI_MBPS: f64 = 20.0;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no strategy named {0} in the catalog")]
    UnknownStrategy(String),

    #[error(transparent)]
    Experiment(#[from] ExperimentError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// External collaborators, injected at construction.
#[derive(Clone)]
pub struct Providers {
    pub store: Arc<dyn CacheStore>,
    pub network: Arc<dyn NetworkInfo>,
    pub device: Arc<dyn DeviceProbe>,
    pub analytics: Arc<dyn BehaviorAnalytics>,
}

/// The currently active strategy (a working copy: adaptive scaling may
/// shrink its layer weights, the catalog entry stays pristine).
struct ActiveStrategy {
    strategy: Strategy,
    score: f64,
}

/// A fetch waiting for its resource allocation.
#[derive(Debug, Clone)]
struct FetchJob {
    key: ContentKey,
    quality: Quality,
    /// Id of the sibling request (primary vs fallback) to discard when
    /// this one is allocated.
    sibling: Option<String>,
}

/// Point-in-time engine statistics for the downstream consumer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStatus {
    pub active_strategy: String,
    pub strategy_score: f64,
    pub predictions_generated: u64,
    pub requests_admitted: u64,
    pub requests_rejected: u64,
    pub requests_dropped: u64,
    pub queued_requests: usize,
    pub active_allocations: usize,
    pub cached_items: usize,
    pub cached_bytes: u64,
    pub experiments_archived: usize,
    pub experiment_active: bool,
}

/// The engine.
pub struct PrefetchEngine {
    config: Arc<Config>,
    providers: Providers,

    catalog: Vec<Strategy>,
    active: RwLock<ActiveStrategy>,

    scheduler: Mutex<ResourceScheduler>,
    tuner: Mutex<AdaptiveTuner>,
    monitor: HealthMonitor,
    last_snapshot: RwLock<Option<HealthSnapshot>>,

    generator: PredictionGenerator,

    /// Fetches keyed by request id, waiting for allocation.
    pending_fetches: Mutex<HashMap<String, FetchJob>>,

    pub metrics: EngineMetrics,

    alert_tx: broadcast::Sender<Alert>,
    shutdown_tx: watch::Sender<bool>,
}

impl PrefetchEngine {
    pub fn new(config: Arc<Config>, providers: Providers) -> Arc<Self> {
        let catalog = builtin_catalog();
        let initial = ActiveStrategy {
            strategy: catalog[0].clone(),
            score: 0.0,
        };
        let (alert_tx, _) = broadcast::channel(64);
        let (shutdown_tx, _) = watch::channel(false);

        Arc::new(Self {
            scheduler: Mutex::new(ResourceScheduler::new(config.scheduler.clone())),
            tuner: Mutex::new(AdaptiveTuner::new(
                config.tuning.clone(),
                TuningParams {
                    aging_factor: config.eviction.aging_factor,
                    behavior_weight: config.eviction.behavior_weight,
                    ..TuningParams::default()
                },
            )),
            monitor: HealthMonitor::new(config.health.clone()),
            generator: PredictionGenerator::new(config.prediction.clone()),
            last_snapshot: RwLock::new(None),
            pending_fetches: Mutex::new(HashMap::new()),
            metrics: EngineMetrics::new(),
            alert_tx,
            shutdown_tx,
            catalog,
            active: RwLock::new(initial),
            config,
            providers,
        })
    }

    // ─── Lifecycle ─────────────────────────────────────────────────────

    /// Spawn all periodic loops. Idempotent shutdown via [`stop`].
    ///
    /// [`stop`]: PrefetchEngine::stop
    pub fn start(self: &Arc<Self>) {
        let loops: [(&str, Duration); 7] = [
            ("prediction", self.config.prediction_cycle()),
            ("scheduler", self.config.scheduler_tick()),
            ("metrics", Duration::from_secs(self.config.tuning.sample_secs)),
            (
                "experiment",
                Duration::from_secs(self.config.tuning.experiment_sample_secs),
            ),
            (
                "tuning",
                Duration::from_secs(self.config.tuning.analysis_secs),
            ),
            ("health", Duration::from_secs(self.config.health.check_secs)),
            (
                "deep-analysis",
                Duration::from_secs(self.config.health.deep_analysis_secs),
            ),
        ];

        for (name, period) in loops {
            let engine = Arc::clone(self);
            let mut shutdown = self.shutdown_tx.subscribe();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => engine.run_cycle(name).await,
                        _ = shutdown.changed() => {
                            debug!(loop_name = name, "Loop stopped");
                            break;
                        }
                    }
                }
            });
        }
        info!("Prefetch engine started");
    }

    /// Stop all loops. In-flight fetches complete on their own.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        info!("Prefetch engine stopping");
    }

    async fn run_cycle(self: &Arc<Self>, name: &str) {
        match name {
            "prediction" => self.prediction_cycle().await,
            "scheduler" => self.scheduler_cycle().await,
            "metrics" => self.metrics_cycle().await,
            "experiment" => self.experiment_cycle().await,
            "tuning" => self.tuning_cycle().await,
            "health" => self.health_cycle().await,
            "deep-analysis" => self.deep_analysis_cycle().await,
            _ => unreachable!("unknown loop"),
        }
    }

    // ─── Environment probing ───────────────────────────────────────────

    /// Build an environment snapshot, substituting conservative defaults
    /// for failed probes.
    async fn env_snapshot(&self, stats: Option<&SessionStats>) -> EnvSnapshot {
        let defaults = EnvSnapshot::default();

        let network_class = self.providers.network.network_class().unwrap_or_else(|| {
            warn!("Network probe unavailable, assuming unknown class");
            defaults.network_class
        });
        let latency = self.providers.network.latency().unwrap_or(defaults.latency);
        let battery_level = self.providers.device.battery_level().unwrap_or_else(|| {
            warn!("Battery probe unavailable, assuming 50%");
            defaults.battery_level
        });
        let charging = self.providers.device.is_charging().unwrap_or(false);
        let storage_utilization = match self.providers.store.stats().await {
            Ok(s) => s.total_size as f64 / self.config.eviction.max_cache_bytes.max(1) as f64,
            Err(e) => {
                warn!(error = %e, "Store stats unavailable, assuming 50% utilization");
                defaults.storage_utilization
            }
        };

        let (reading_speed, skip_rate) = stats
            .map(|s| (s.reading_speed, s.skip_rate))
            .unwrap_or((defaults.reading_speed, defaults.skip_rate));

        EnvSnapshot {
            network_class,
            latency,
            battery_level,
            charging,
            storage_utilization: storage_utilization.clamp(0.0, 1.0),
            reading_speed,
            skip_rate,
        }
    }

    // ─── Prediction loop ───────────────────────────────────────────────

    async fn prediction_cycle(self: &Arc<Self>) {
        let stats = match self.providers.analytics.session_stats() {
            Some(s) => s,
            None => {
                // No session: nothing to predict this cycle.
                debug!("No session stats, skipping prediction cycle");
                return;
            }
        };
        let env = self.env_snapshot(Some(&stats)).await;

        // Update the scheduler's view of the network and read the outlook.
        let (outlook, bandwidth_mbps) = {
            let mut sched = self.scheduler.lock().await;
            sched.set_network_class(env.network_class);
            let free_fraction = if sched.total().network_bandwidth > 0.0 {
                sched.available().network_bandwidth / sched.total().network_bandwidth
            } else {
                0.0
            };
            (
                ResourceOutlook {
                    available_bandwidth: sched.available().network_bandwidth,
                    storage_utilization: env.storage_utilization,
                    battery_level: env.battery_level,
                },
                env.network_class.bandwidth_estimate() * WIFI_MBPS * free_fraction,
            )
        };

        self.reselect_if_degraded(&env, &outlook).await;

        let ctx = GenerationContext {
            patterns: self.providers.analytics.matched_patterns(),
            stats,
            available_bandwidth_mbps: bandwidth_mbps,
            now: Instant::now(),
        };

        let strategy = self.active.read().await.strategy.clone();
        let predictions = self.generator.generate(&strategy, &ctx);
        self.metrics
            .predictions_generated
            .inc_by(predictions.len() as u64);

        let quality = env.network_class.ideal_quality();
        self.submit_predictions(predictions, quality).await;
    }

    /// Re-score the active strategy; if its fit degraded, re-run selection.
    async fn reselect_if_degraded(&self, env: &EnvSnapshot, outlook: &ResourceOutlook) {
        let current_score = {
            let active = self.active.read().await;
            score_strategy(&active.strategy, env, outlook)
        };
        if current_score >= DEGRADED_FIT {
            let mut active = self.active.write().await;
            active.score = current_score;
            return;
        }

        if let Some(best) = select_strategy(&self.catalog, env, outlook) {
            let mut active = self.active.write().await;
            if best.name != active.strategy.name {
                info!(
                    from = %active.strategy.name,
                    to = %best.name,
                    score = best.score,
                    "Switching strategy on degraded fit"
                );
                active.strategy = self.catalog[best.index].clone();
            }
            active.score = best.score;
        }
    }

    /// Turn surviving predictions into resource requests and submit them.
    async fn submit_predictions(self: &Arc<Self>, predictions: Vec<Prediction>, quality: Quality) {
        // Skip keys the store already holds: re-fetching would burn quota
        // and reset the item's age and access history, making hot items
        // look cold to the evictor. A downgraded rendition stays downgraded
        // until evicted.
        let mut batch = Vec::with_capacity(predictions.len());
        for p in predictions {
            match self.providers.store.get(&p.key).await {
                Ok(Some(_)) => {
                    debug!(key = %p.key, "Already cached, skipping prefetch");
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(key = %p.key, error = %e, "Cache lookup failed, fetching anyway");
                }
            }
            batch.push(p);
        }
        // A dependency on a skipped or dropped prediction is either already
        // satisfied by the cache or unsatisfiable; keeping the edge would
        // stall the queue tier.
        prune_dangling_dependencies(&mut batch);

        // Map prediction ids to request ids so dependency chains survive
        // the translation.
        let id_of = |uuid: &Uuid| uuid.to_string();

        for p in batch {
            let request_id = id_of(&p.id);
            let fallback_quality = quality.downgrade();
            let fallback_id = fallback_quality.map(|_| format!("{request_id}:lite"));

            let request = ResourceRequest {
                id: request_id.clone(),
                requester: requester_tag(p.kind).to_string(),
                priority: scheduler_priority(p.priority),
                cost: spread_cost(p.resource_cost),
                estimated_duration: Duration::from_secs(5),
                deadline: Some(p.valid_until),
                dependencies: p.dependencies.iter().map(&id_of).collect(),
                fallback: fallback_quality.map(|_| {
                    Box::new(ResourceRequest {
                        id: fallback_id.clone().expect("set together"),
                        requester: requester_tag(p.kind).to_string(),
                        priority: scheduler_priority(p.priority),
                        cost: spread_cost(p.resource_cost * 0.4),
                        estimated_duration: Duration::from_secs(5),
                        deadline: Some(p.valid_until),
                        dependencies: p.dependencies.iter().map(&id_of).collect(),
                        fallback: None,
                        background: p.kind == PredictionKind::VocabularyAdaptation,
                    })
                }),
                background: p.kind == PredictionKind::VocabularyAdaptation,
            };

            {
                let mut pending = self.pending_fetches.lock().await;
                pending.insert(
                    request_id.clone(),
                    FetchJob {
                        key: p.key.clone(),
                        quality,
                        sibling: fallback_id.clone(),
                    },
                );
                if let (Some(fid), Some(fq)) = (fallback_id, fallback_quality) {
                    pending.insert(
                        fid,
                        FetchJob {
                            key: p.key.clone(),
                            quality: fq,
                            sibling: Some(request_id.clone()),
                        },
                    );
                }
            }

            let admission = {
                let mut sched = self.scheduler.lock().await;
                sched.request_resources(request)
            };

            match admission {
                Ok(Admission::Allocated) => {
                    self.metrics.requests_admitted.inc();
                    self.dispatch_fetch(&request_id).await;
                }
                Ok(Admission::Queued(_)) => {}
                Err(e) => {
                    self.metrics.requests_rejected.inc();
                    debug!(id = %request_id, error = %e, "Request rejected");
                    self.discard_job(&request_id).await;
                }
            }
        }
    }

    /// Remove a job and its sibling from the pending map.
    async fn discard_job(&self, id: &str) {
        let mut pending = self.pending_fetches.lock().await;
        if let Some(job) = pending.remove(id) {
            if let Some(sibling) = job.sibling {
                pending.remove(&sibling);
            }
        }
    }

    /// Spawn the store fetch for an allocated request, outside all locks.
    async fn dispatch_fetch(self: &Arc<Self>, id: &str) {
        let job = {
            let mut pending = self.pending_fetches.lock().await;
            let job = pending.remove(id);
            if let Some(j) = &job {
                if let Some(sibling) = &j.sibling {
                    pending.remove(sibling);
                }
            }
            job
        };
        let job = match job {
            Some(j) => j,
            None => return,
        };

        let engine = Arc::clone(self);
        let id = id.to_string();
        tokio::spawn(async move {
            match engine.providers.store.prefetch(&job.key, job.quality).await {
                Ok(bytes) => {
                    engine.metrics.prefetches_completed.inc();
                    debug!(key = %job.key, bytes, "Prefetch complete");
                }
                Err(e) => {
                    engine.metrics.prefetch_failures.inc();
                    warn!(key = %job.key, error = %e, "Prefetch failed");
                }
            }
            let mut sched = engine.scheduler.lock().await;
            // The allocation may have been force-reclaimed meanwhile.
            if let Err(SchedulerError::UnknownAllocation(_)) =
                sched.complete_allocation(&id)
            {
                debug!(id = %id, "Allocation already reclaimed");
            }
        });
    }

    // ─── Scheduler loop ────────────────────────────────────────────────

    async fn scheduler_cycle(self: &Arc<Self>) {
        let report = {
            let mut sched = self.scheduler.lock().await;
            sched.tick()
        };

        for id in &report.dropped {
            self.metrics.requests_dropped.inc();
            self.discard_job(id).await;
        }
        for id in &report.allocated {
            self.metrics.requests_admitted.inc();
            self.dispatch_fetch(id).await;
        }
    }

    // ─── Metrics / health loop ─────────────────────────────────────────

    async fn metrics_cycle(self: &Arc<Self>) {
        let Some(snapshot) = self.compute_health().await else {
            return;
        };

        self.metrics.health_score.set(snapshot.overall);
        for alert in &snapshot.alerts {
            let _ = self.alert_tx.send(alert.clone());
        }

        let stats = self.providers.analytics.session_stats();
        let (hit_rate, skip_rate) = stats
            .as_ref()
            .map(|s| (s.hit_rate, s.skip_rate))
            .unwrap_or((0.5, 0.0));

        {
            let mut tuner = self.tuner.lock().await;
            tuner.record_sample(MetricSample {
                at: Instant::now(),
                overall_score: snapshot.overall,
                hit_rate,
                prefetch_accuracy: self.prefetch_accuracy(),
                storage_efficiency: snapshot.storage / 100.0,
                satisfaction: (hit_rate * (1.0 - skip_rate)).clamp(0.0, 1.0),
            });
        }

        *self.last_snapshot.write().await = Some(snapshot);

        self.maybe_evict().await;
    }

    /// Fraction of completed prefetches among all dispatched.
    fn prefetch_accuracy(&self) -> f64 {
        let done = self.metrics.prefetches_completed.get() as f64;
        let failed = self.metrics.prefetch_failures.get() as f64;
        if done + failed == 0.0 {
            return 1.0;
        }
        done / (done + failed)
    }

    async fn compute_health(&self) -> Option<HealthSnapshot> {
        let store_stats = match self.providers.store.stats().await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Skipping health computation: store stats unavailable");
                return None;
            }
        };
        let items = match self.providers.store.list().await {
            Ok(i) => i,
            Err(e) => {
                warn!(error = %e, "Skipping health computation: enumeration failed");
                return None;
            }
        };

        let session = self.providers.analytics.session_stats();
        let network_class = self
            .providers
            .network
            .network_class()
            .unwrap_or(NetworkClass::Unknown);

        let utilization =
            store_stats.total_size as f64 / self.config.eviction.max_cache_bytes.max(1) as f64;

        let total_bytes: u64 = items.iter().map(|i| i.size_bytes).sum();
        let accessed_bytes: u64 = items
            .iter()
            .filter(|i| i.access_count > 0)
            .map(|i| i.size_bytes)
            .sum();
        let quota_efficiency = if total_bytes > 0 {
            accessed_bytes as f64 / total_bytes as f64
        } else {
            1.0
        };

        let mut by_quality: HashMap<Quality, u64> = HashMap::new();
        for item in &items {
            *by_quality.entry(item.quality).or_default() += item.size_bytes;
        }
        let quality_distribution: Vec<(Quality, f64)> = by_quality
            .into_iter()
            .map(|(q, b)| (q, b as f64 / total_bytes.max(1) as f64))
            .collect();

        let bandwidth_efficiency = {
            let sched = self.scheduler.lock().await;
            let s = sched.stats();
            if s.admitted > 0 {
                (s.completed as f64 / s.admitted as f64).clamp(0.0, 1.0)
            } else {
                1.0
            }
        };

        let inputs = HealthInputs {
            fragmentation: estimate_fragmentation(&items),
            quota_efficiency,
            hit_rate: session.as_ref().map(|s| s.hit_rate).unwrap_or(0.5),
            avg_load_time_ms: session
                .as_ref()
                .map(|s| s.avg_load_time_ms)
                .unwrap_or(500.0),
            utilization: utilization.clamp(0.0, 1.0),
            quality_distribution,
            bandwidth_efficiency,
            network_class,
        };
        Some(self.monitor.compute(&inputs))
    }

    // ─── Eviction ──────────────────────────────────────────────────────

    /// Derive the current eviction policy and run a pass if the store is
    /// over its trigger size.
    pub async fn maybe_evict(&self) -> Option<EvictionReport> {
        let network_class = self
            .providers
            .network
            .network_class()
            .unwrap_or(NetworkClass::Unknown);

        let policy = {
            let tuner = self.tuner.lock().await;
            let params = tuner.current_params();

            let mut eviction = self.config.eviction.clone();
            eviction.aging_factor = params.aging_factor;
            eviction.behavior_weight = params.behavior_weight;
            // A lowered utilization target shrinks the effective quota.
            eviction.max_cache_bytes = ((eviction.max_cache_bytes as f64
                * (params.target_utilization / 0.8))
                .min(eviction.max_cache_bytes as f64)) as u64;
            EvictionPolicy::for_network(&eviction, network_class)
        };

        let skip_rate = self
            .providers
            .analytics
            .session_stats()
            .map(|s| s.skip_rate)
            .unwrap_or(0.0);
        let ctx = EvictionContext {
            now: SystemTime::now(),
            network_class,
            skip_rate,
        };

        match Evictor::run_pass(self.providers.store.as_ref(), &policy, &ctx).await {
            Ok(report) => {
                if report.triggered {
                    self.metrics.items_evicted.inc_by(report.deleted as u64);
                    self.metrics
                        .items_downgraded
                        .inc_by(report.downgraded as u64);
                }
                Some(report)
            }
            Err(e) => {
                // Aborted pass; the next cycle retries.
                warn!(error = %e, "Eviction pass aborted");
                None
            }
        }
    }

    // ─── Tuning loops ──────────────────────────────────────────────────

    async fn experiment_cycle(&self) {
        let mut tuner = self.tuner.lock().await;
        if let Some(outcome) = tuner.experiment_tick(Instant::now()) {
            info!(?outcome, "Experiment concluded");
        }
    }

    async fn tuning_cycle(&self) {
        let mut tuner = self.tuner.lock().await;
        let applied = tuner.auto_apply();
        if !applied.is_empty() {
            info!(count = applied.len(), "Applied tuning recommendations");
        }
    }

    async fn health_cycle(&self) {
        if let Some(snapshot) = self.compute_health().await {
            info!(
                overall = snapshot.overall,
                grade = %snapshot.grade,
                alerts = snapshot.alerts.len(),
                "Health check"
            );
            for alert in &snapshot.alerts {
                let _ = self.alert_tx.send(alert.clone());
            }
            *self.last_snapshot.write().await = Some(snapshot);
        }
    }

    /// Deep analysis: unconditional eviction audit plus adaptive layer
    /// scaling when health is poor.
    async fn deep_analysis_cycle(&self) {
        self.maybe_evict().await;

        let overall = self
            .last_snapshot
            .read()
            .await
            .as_ref()
            .map(|s| s.overall)
            .unwrap_or(100.0);

        if overall < 50.0 {
            let mut active = self.active.write().await;
            for layer in active.strategy.layers.iter_mut() {
                if layer.adaptive_scaling {
                    layer.resource_weight = (layer.resource_weight * 0.8).max(0.1);
                }
            }
            info!(
                strategy = %active.strategy.name,
                "Scaled down adaptive layer weights under degraded health"
            );
        }
    }

    // ─── Downstream consumer API ───────────────────────────────────────

    pub async fn active_strategy(&self) -> Strategy {
        self.active.read().await.strategy.clone()
    }

    /// Force a strategy switch by catalog name.
    pub async fn force_strategy(&self, name: &str) -> Result<(), EngineError> {
        let found = self
            .catalog
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownStrategy(name.to_string()))?;

        let mut active = self.active.write().await;
        info!(from = %active.strategy.name, to = %name, "Forced strategy switch");
        active.strategy = found;
        active.score = 1.0;
        Ok(())
    }

    pub fn catalog(&self) -> &[Strategy] {
        &self.catalog
    }

    /// Queue an experiment with the given parameter variant.
    pub async fn queue_experiment(
        &self,
        name: &str,
        variant: TuningParams,
    ) -> Result<Uuid, EngineError> {
        let mut tuner = self.tuner.lock().await;
        Ok(tuner.start_experiment(name, variant)?)
    }

    pub async fn current_params(&self) -> TuningParams {
        self.tuner.lock().await.current_params().clone()
    }

    /// Archived experiments plus the active one, oldest first.
    pub async fn experiments(&self) -> Vec<Experiment> {
        let tuner = self.tuner.lock().await;
        let mut out: Vec<Experiment> = tuner.archive().cloned().collect();
        if let Some(active) = tuner.active_experiment() {
            out.push(active.clone());
        }
        out
    }

    pub async fn active_strategy_score(&self) -> f64 {
        self.active.read().await.score
    }

    pub async fn health(&self) -> Option<HealthSnapshot> {
        self.last_snapshot.read().await.clone()
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<Alert> {
        self.alert_tx.subscribe()
    }

    pub async fn status(&self) -> EngineStatus {
        let active = self.active.read().await;
        let sched = self.scheduler.lock().await;
        let sched_stats = sched.stats();
        let store_stats = self.providers.store.stats().await.unwrap_or_default();
        let tuner = self.tuner.lock().await;

        EngineStatus {
            active_strategy: active.strategy.name.clone(),
            strategy_score: active.score,
            predictions_generated: self.metrics.predictions_generated.get(),
            requests_admitted: sched_stats.admitted,
            requests_rejected: sched_stats.rejected,
            requests_dropped: sched_stats.dropped,
            queued_requests: sched.total_queued(),
            active_allocations: sched.active_allocations(),
            cached_items: store_stats.item_count,
            cached_bytes: store_stats.total_size,
            experiments_archived: tuner.archive().count(),
            experiment_active: tuner.active_experiment().is_some(),
        }
    }
}

/// Map a prediction priority (1-100) onto the scheduler's 1-10 range.
fn scheduler_priority(priority: u8) -> u8 {
    priority.div_ceil(10).clamp(1, 10)
}

/// Spread a scalar prediction cost across the four quota dimensions.
fn spread_cost(cost: f64) -> ResourceQuota {
    let cost = cost.clamp(0.0, 1.0);
    ResourceQuota::new(cost, cost * 0.5, cost * 0.3, cost * 0.2)
}

fn requester_tag(kind: PredictionKind) -> &'static str {
    match kind {
        PredictionKind::Sequential => "predict-sequential",
        PredictionKind::Behavioral => "predict-behavioral",
        PredictionKind::ChapterBoundary => "predict-chapter",
        PredictionKind::SkipPattern => "predict-skip",
        PredictionKind::VocabularyAdaptation => "predict-vocab",
    }
}

/// Rough fragmentation estimate: the byte-weighted share of undersized
/// items. Many tiny items mean a fragmented quota.
fn estimate_fragmentation(items: &[CachedItemMeta]) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    let mean = items.iter().map(|i| i.size_bytes).sum::<u64>() as f64 / items.len() as f64;
    let small = items
        .iter()
        .filter(|i| (i.size_bytes as f64) < mean / 2.0)
        .count();
    (small as f64 / items.len() as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::memory::{
        sim_position, MemoryCacheStore, ScriptedAnalytics, StaticDeviceProbe, StaticNetworkInfo,
    };

    fn engine() -> Arc<PrefetchEngine> {
        let config = Arc::new(Config::default());
        let providers = Providers {
            store: Arc::new(MemoryCacheStore::new()),
            network: Arc::new(StaticNetworkInfo::new(
                NetworkClass::Wifi,
                Duration::from_millis(40),
            )),
            device: Arc::new(StaticDeviceProbe::new(0, 1 << 30, 0.9)),
            analytics: Arc::new(ScriptedAnalytics::new(sim_position())),
        };
        PrefetchEngine::new(config, providers)
    }

    #[test]
    fn test_scheduler_priority_mapping() {
        assert_eq!(scheduler_priority(100), 10);
        assert_eq!(scheduler_priority(96), 10);
        assert_eq!(scheduler_priority(75), 8);
        assert_eq!(scheduler_priority(20), 2);
        assert_eq!(scheduler_priority(1), 1);
    }

    #[test]
    fn test_spread_cost_dimensions() {
        let q = spread_cost(0.4);
        assert!((q.network_bandwidth - 0.4).abs() < 1e-12);
        assert!((q.storage_space - 0.2).abs() < 1e-12);
        assert!(q.cpu_time < q.storage_space);
    }

    #[tokio::test]
    async fn test_prediction_cycle_populates_store() {
        let engine = engine();
        engine.prediction_cycle().await;

        // Admitted fetches run in spawned tasks; give them a moment.
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(engine.metrics.predictions_generated.get() > 0);
        assert!(engine.metrics.prefetches_completed.get() > 0);
        let stats = engine.providers.store.stats().await.unwrap();
        assert!(stats.item_count > 0);
    }

    #[tokio::test]
    async fn test_cached_keys_are_not_resubmitted() {
        let engine = engine();
        let key = ContentKey::new("b", 0, 1);
        engine
            .providers
            .store
            .prefetch(&key, Quality::High)
            .await
            .unwrap();
        let before = engine.providers.store.get(&key).await.unwrap().unwrap();

        let p = Prediction::new(key.clone(), PredictionKind::Sequential, 80, 0.9);
        engine.submit_predictions(vec![p], Quality::High).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // No request was made and the cached item's history is intact.
        assert_eq!(engine.metrics.requests_admitted.get(), 0);
        let after = engine.providers.store.get(&key).await.unwrap().unwrap();
        assert_eq!(after.created_at, before.created_at);
    }

    #[tokio::test]
    async fn test_dependency_on_cached_prediction_does_not_stall() {
        let engine = engine();
        let parent_key = ContentKey::new("b", 0, 1);
        engine
            .providers
            .store
            .prefetch(&parent_key, Quality::High)
            .await
            .unwrap();

        let parent = Prediction::new(parent_key, PredictionKind::Sequential, 90, 0.9);
        let mut child = Prediction::new(
            ContentKey::new("b", 0, 2),
            PredictionKind::Sequential,
            80,
            0.9,
        );
        child.dependencies = vec![parent.id];

        // The parent is filtered out as already cached; the child's edge is
        // pruned rather than left waiting on an id the scheduler never saw.
        engine.submit_predictions(vec![parent, child], Quality::High).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(engine.metrics.requests_admitted.get(), 1);
        let fetched = engine
            .providers
            .store
            .get(&ContentKey::new("b", 0, 2))
            .await
            .unwrap();
        assert!(fetched.is_some());
    }

    #[tokio::test]
    async fn test_force_strategy() {
        let engine = engine();
        engine.force_strategy("balanced-mobile").await.unwrap();
        assert_eq!(engine.active_strategy().await.name, "balanced-mobile");

        assert!(matches!(
            engine.force_strategy("nope").await,
            Err(EngineError::UnknownStrategy(_))
        ));
    }

    #[tokio::test]
    async fn test_status_reflects_activity() {
        let engine = engine();
        engine.prediction_cycle().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let status = engine.status().await;
        assert!(status.predictions_generated > 0);
        assert!(!status.active_strategy.is_empty());
    }

    #[tokio::test]
    async fn test_eviction_abort_on_enumeration_failure() {
        let config = Arc::new(Config::default());
        let store = Arc::new(MemoryCacheStore::new());
        // Fill past the trigger so a pass would run, then break listing.
        for i in 0..300 {
            store
                .prefetch(&ContentKey::new("b", 0, i), Quality::High)
                .await
                .unwrap();
        }
        store.set_fail_enumeration(true);

        let providers = Providers {
            store: store.clone(),
            network: Arc::new(StaticNetworkInfo::new(
                NetworkClass::Wifi,
                Duration::from_millis(40),
            )),
            device: Arc::new(StaticDeviceProbe::new(0, 1 << 30, 0.9)),
            analytics: Arc::new(ScriptedAnalytics::new(sim_position())),
        };
        let engine = PrefetchEngine::new(config, providers);

        assert!(engine.maybe_evict().await.is_none());

        // Next cycle, with enumeration healthy again, the pass succeeds.
        store.set_fail_enumeration(false);
        let report = engine.maybe_evict().await.unwrap();
        assert!(report.triggered);
        assert!(report.bytes_reclaimed > 0);
    }
}
