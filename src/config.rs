//! Runtime configuration for adaptive-prefetch.
//!
//! Configuration can be loaded from a JSON file or constructed
//! programmatically. All tuning knobs (loop periods, queue sizes, eviction
//! weights, experiment bounds) live here.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "adaptive-prefetch",
    about = "Adaptive content prefetch and cache-management engine"
)]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,

    /// Resource scheduler settings.
    pub scheduler: SchedulerConfig,

    /// Prediction generator settings.
    pub prediction: PredictionConfig,

    /// Eviction engine settings.
    pub eviction: EvictionConfig,

    /// Adaptive tuner and experiment settings.
    pub tuning: TuningConfig,

    /// Health monitor settings.
    pub health: HealthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            scheduler: SchedulerConfig::default(),
            prediction: PredictionConfig::default(),
            eviction: EvictionConfig::default(),
            tuning: TuningConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8080").
    pub listen: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Resource scheduler knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Scheduling tick period in seconds.
    pub tick_secs: u64,

    /// Baseline total quota per dimension. Network bandwidth is re-derived
    /// from the network class at runtime; the rest start here.
    pub base_network_bandwidth: f64,
    pub base_storage_space: f64,
    pub base_cpu_time: f64,
    pub base_battery_budget: f64,

    /// Background queue is drained only when every dimension's utilization
    /// is below this fraction.
    pub idle_threshold: f64,

    /// Rolling window of completion efficiencies used for capacity nudging.
    pub efficiency_window: usize,

    /// Nudge capacity down when windowed efficiency falls below this.
    pub low_efficiency_threshold: f64,

    /// Nudge capacity up when windowed efficiency rises above this.
    pub high_efficiency_threshold: f64,

    /// Grace period after an allocation's estimated end before it is
    /// force-reclaimed, in seconds.
    pub reclaim_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 2,
            base_network_bandwidth: 1.0,
            base_storage_space: 1.0,
            base_cpu_time: 1.0,
            base_battery_budget: 1.0,
            idle_threshold: 0.3,
            efficiency_window: 10,
            low_efficiency_threshold: 0.70,
            high_efficiency_threshold: 0.95,
            reclaim_grace_secs: 30,
        }
    }
}

/// Prediction generator knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionConfig {
    /// Generation cycle period in seconds.
    pub cycle_secs: u64,

    /// Maximum sequential lookahead depth.
    pub max_sequential_depth: usize,

    /// Maximum predictions surviving a cycle after ranking.
    pub max_predictions: usize,

    /// Prediction validity window in seconds.
    pub valid_for_secs: u64,

    /// Minimum pattern confidence for behavioral predictions.
    pub min_pattern_confidence: f64,

    /// Skip rate above which the skip-pattern layer activates.
    pub skip_rate_threshold: f64,

    /// Chapter progress fraction past which the boundary layer fires.
    pub chapter_boundary_fraction: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            cycle_secs: 5,
            max_sequential_depth: 20,
            max_predictions: 50,
            valid_for_secs: 60,
            min_pattern_confidence: 0.6,
            skip_rate_threshold: 0.2,
            chapter_boundary_fraction: 0.8,
        }
    }
}

/// Eviction score weights and bounds.
///
/// Weights are the baseline; the adaptive tuner may adjust `behavior_weight`
/// and `aging_factor` at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvictionConfig {
    /// Maximum cache size in bytes.
    pub max_cache_bytes: u64,

    /// Weight for the inverted priority-tier component.
    pub priority_weight: f64,

    /// Weight for the age component (capped at 30 days).
    pub age_weight: f64,

    /// Weight for the log-dampened access-frequency component.
    pub access_weight: f64,

    /// Weight for the recency component (capped at 7 days).
    pub recency_weight: f64,

    /// Weight for the network-dependent quality-mismatch component.
    pub quality_weight: f64,

    /// Weight for the size component.
    pub size_weight: f64,

    /// Weight for the behavior (skip-signal) component.
    pub behavior_weight: f64,

    /// Age scaling factor; higher makes old items score higher sooner.
    pub aging_factor: f64,

    /// Size ceiling in bytes for the size component.
    pub size_cap_bytes: u64,

    /// Downgrade only when estimated savings exceed this fraction of size.
    pub min_downgrade_savings: f64,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            max_cache_bytes: 100 * 1024 * 1024, // 100 MB
            priority_weight: 0.25,
            age_weight: 0.15,
            access_weight: 0.15,
            recency_weight: 0.15,
            quality_weight: 0.1,
            size_weight: 0.1,
            behavior_weight: 0.1,
            aging_factor: 1.0,
            size_cap_bytes: 10 * 1024 * 1024,
            min_downgrade_savings: 0.2,
        }
    }
}

/// Adaptive tuner and experiment runner knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningConfig {
    /// Metric sampling period in seconds.
    pub sample_secs: u64,

    /// Experiment in-flight sampling period in seconds.
    pub experiment_sample_secs: u64,

    /// Tuning analysis period in seconds.
    pub analysis_secs: u64,

    /// Hard ceiling on experiment duration in seconds.
    pub max_experiment_secs: u64,

    /// Trailing samples used for control/variant averages.
    pub trailing_samples: usize,

    /// Minimum samples before an experiment can be evaluated.
    pub min_samples: usize,

    /// Early-terminate when the variant average falls below control by this
    /// fraction.
    pub early_stop_drop: f64,

    /// Default significance threshold for adopting a variant.
    pub significance: f64,

    /// Bounded experiment archive length.
    pub archive_len: usize,

    /// Auto-apply a recommendation only at or above this confidence.
    pub auto_apply_confidence: f64,

    /// Auto-apply only when expected improvement is at least this fraction.
    pub auto_apply_improvement: f64,

    /// Rolling metric history length.
    pub history_len: usize,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            sample_secs: 30,
            experiment_sample_secs: 60,
            analysis_secs: 300,
            max_experiment_secs: 3600,
            trailing_samples: 5,
            min_samples: 3,
            early_stop_drop: 0.10,
            significance: 0.02,
            archive_len: 20,
            auto_apply_confidence: 0.7,
            auto_apply_improvement: 0.05,
            history_len: 240,
        }
    }
}

/// Health monitor knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Health check period in seconds.
    pub check_secs: u64,

    /// Deep analysis period in seconds.
    pub deep_analysis_secs: u64,

    /// Utilization above which a critical alert is raised.
    pub critical_utilization: f64,

    /// Average load time (ms) above which a warning is raised.
    pub warning_load_time_ms: f64,

    /// Hit rate below which a warning is raised.
    pub warning_hit_rate: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_secs: 900,
            deep_analysis_secs: 7200,
            critical_utilization: 0.95,
            warning_load_time_ms: 3000.0,
            warning_hit_rate: 0.3,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults when
    /// the file is absent.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    pub fn scheduler_tick(&self) -> Duration {
        Duration::from_secs(self.scheduler.tick_secs)
    }

    pub fn prediction_cycle(&self) -> Duration {
        Duration::from_secs(self.prediction.cycle_secs)
    }
}
