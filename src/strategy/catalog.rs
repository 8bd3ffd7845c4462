//! Strategy catalog: immutable bundles of prefetch layers, a resource
//! budget, and activation conditions.
//!
//! The catalog is loaded once at startup; at any moment exactly one
//! strategy is active. The only runtime mutation a strategy undergoes is
//! adaptive down-scaling of layer resource weights under degraded health.

use serde::{Deserialize, Serialize};

use crate::types::{EnvSnapshot, NetworkClass};

/// One predictive heuristic within a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerKind {
    /// Read-ahead from the current position.
    Sequential,
    /// Predictions from matched behavior patterns.
    Behavioral,
    /// Next-chapter start when close to a chapter boundary.
    ChapterBoundary,
    /// Jump-ahead predictions for users who skip frequently.
    SkipPattern,
    /// Original-level variant for users reading simplified text.
    VocabularyAdaptation,
}

/// A prefetch layer: one heuristic plus its scheduling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub kind: LayerKind,

    /// Layer priority, 1 (lowest) to 10.
    pub priority: u8,

    pub enabled: bool,

    /// Baseline confidence multiplier in [0,1].
    pub confidence: f64,

    /// Share of the strategy's resource budget, in [0,1].
    pub resource_weight: f64,

    /// Whether the engine may scale `resource_weight` down under stress.
    pub adaptive_scaling: bool,
}

impl Layer {
    pub fn new(kind: LayerKind, priority: u8, confidence: f64, resource_weight: f64) -> Self {
        Self {
            kind,
            priority,
            enabled: true,
            confidence,
            resource_weight,
            adaptive_scaling: true,
        }
    }
}

/// Fractional resource budget a strategy is allowed to consume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceBudget {
    pub network: f64,
    pub storage: f64,
    pub cpu: f64,
    pub battery: f64,
}

impl ResourceBudget {
    pub const fn new(network: f64, storage: f64, cpu: f64, battery: f64) -> Self {
        Self {
            network,
            storage,
            cpu,
            battery,
        }
    }
}

/// Numeric environment signals a condition can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    /// Battery charge level in [0,1].
    BatteryLevel,
    /// Storage quota utilization in [0,1].
    StorageUtilization,
    /// Session skip rate in [0,1].
    SkipRate,
    /// Reading speed in sentences per minute.
    ReadingSpeed,
    /// Network round-trip latency in milliseconds.
    LatencyMs,
}

impl Signal {
    pub fn read(&self, env: &EnvSnapshot) -> f64 {
        match self {
            Signal::BatteryLevel => env.battery_level,
            Signal::StorageUtilization => env.storage_utilization,
            Signal::SkipRate => env.skip_rate,
            Signal::ReadingSpeed => env.reading_speed,
            Signal::LatencyMs => env.latency.as_millis() as f64,
        }
    }
}

/// An activation condition with its selection weight.
///
/// Conditions are a closed sum; evaluation is an exhaustive match so a new
/// operator cannot be added without the compiler pointing at every site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Condition {
    GreaterThan {
        signal: Signal,
        threshold: f64,
        weight: f64,
    },
    LessThan {
        signal: Signal,
        threshold: f64,
        weight: f64,
    },
    Equals {
        signal: Signal,
        value: f64,
        weight: f64,
    },
    Between {
        signal: Signal,
        lo: f64,
        hi: f64,
        weight: f64,
    },
    NetworkIn {
        classes: Vec<NetworkClass>,
        weight: f64,
    },
}

impl Condition {
    pub fn weight(&self) -> f64 {
        match self {
            Condition::GreaterThan { weight, .. }
            | Condition::LessThan { weight, .. }
            | Condition::Equals { weight, .. }
            | Condition::Between { weight, .. }
            | Condition::NetworkIn { weight, .. } => *weight,
        }
    }

    /// Whether this condition holds for the given environment.
    pub fn is_met(&self, env: &EnvSnapshot) -> bool {
        match self {
            Condition::GreaterThan {
                signal, threshold, ..
            } => signal.read(env) > *threshold,
            Condition::LessThan {
                signal, threshold, ..
            } => signal.read(env) < *threshold,
            Condition::Equals { signal, value, .. } => (signal.read(env) - value).abs() < 1e-9,
            Condition::Between { signal, lo, hi, .. } => {
                let v = signal.read(env);
                v >= *lo && v <= *hi
            }
            Condition::NetworkIn { classes, .. } => classes.contains(&env.network_class),
        }
    }
}

/// A named, immutable prefetch strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub name: String,
    pub layers: Vec<Layer>,
    pub budget: ResourceBudget,
    pub conditions: Vec<Condition>,
}

impl Strategy {
    /// Enabled layers in declaration order.
    pub fn enabled_layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter().filter(|l| l.enabled)
    }
}

/// The built-in strategy catalog, most aggressive first.
pub fn builtin_catalog() -> Vec<Strategy> {
    vec![
        Strategy {
            name: "aggressive-wifi".to_string(),
            layers: vec![
                Layer::new(LayerKind::Sequential, 9, 0.95, 0.5),
                Layer::new(LayerKind::Behavioral, 7, 0.8, 0.2),
                Layer::new(LayerKind::ChapterBoundary, 6, 0.85, 0.1),
                Layer::new(LayerKind::SkipPattern, 5, 0.7, 0.1),
                Layer::new(LayerKind::VocabularyAdaptation, 3, 0.6, 0.1),
            ],
            budget: ResourceBudget::new(0.8, 0.6, 0.5, 0.4),
            conditions: vec![
                Condition::NetworkIn {
                    classes: vec![NetworkClass::Wifi],
                    weight: 1.0,
                },
                Condition::GreaterThan {
                    signal: Signal::BatteryLevel,
                    threshold: 0.3,
                    weight: 0.8,
                },
            ],
        },
        Strategy {
            name: "balanced-mobile".to_string(),
            layers: vec![
                Layer::new(LayerKind::Sequential, 8, 0.9, 0.6),
                Layer::new(LayerKind::Behavioral, 6, 0.75, 0.2),
                Layer::new(LayerKind::ChapterBoundary, 5, 0.8, 0.2),
            ],
            budget: ResourceBudget::new(0.5, 0.4, 0.4, 0.3),
            conditions: vec![
                Condition::NetworkIn {
                    classes: vec![NetworkClass::ThreeG, NetworkClass::FourG],
                    weight: 1.0,
                },
                Condition::GreaterThan {
                    signal: Signal::BatteryLevel,
                    threshold: 0.2,
                    weight: 0.5,
                },
            ],
        },
        Strategy {
            name: "conservative-low-power".to_string(),
            layers: vec![
                Layer::new(LayerKind::Sequential, 7, 0.85, 0.8),
                Layer::new(LayerKind::ChapterBoundary, 4, 0.7, 0.2),
            ],
            budget: ResourceBudget::new(0.25, 0.3, 0.2, 0.1),
            conditions: vec![
                Condition::LessThan {
                    signal: Signal::BatteryLevel,
                    threshold: 0.3,
                    weight: 1.0,
                },
                Condition::GreaterThan {
                    signal: Signal::StorageUtilization,
                    threshold: 0.8,
                    weight: 0.4,
                },
            ],
        },
        Strategy {
            name: "minimal-degraded".to_string(),
            layers: vec![Layer::new(LayerKind::Sequential, 5, 0.8, 1.0)],
            budget: ResourceBudget::new(0.1, 0.2, 0.1, 0.05),
            conditions: vec![Condition::NetworkIn {
                classes: vec![
                    NetworkClass::Slow2G,
                    NetworkClass::TwoG,
                    NetworkClass::Unknown,
                ],
                weight: 1.0,
            }],
        },
    ]
}
