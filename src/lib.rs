//! adaptive-prefetch: adaptive multi-layer content prefetch and
//! cache-management engine for media-heavy reading apps.
//!
//! The engine watches the reading session and the device environment,
//! selects a prefetch strategy from a fixed catalog, turns the strategy's
//! layers into ranked content predictions, schedules the resulting fetches
//! against a four-dimensional resource budget, and keeps the cache inside
//! its quota with scored eviction. A tuner adjusts policy parameters from
//! measured outcomes, optionally through timed A/B experiments, and a
//! health monitor grades the whole loop.
//!
//! Component map:
//!   strategy (catalog + selector) → predict (generator) → sched
//!   (admission + queues) → providers::CacheStore, with evict, tune and
//!   health running on their own cycles. `engine` owns the loops; `server`
//!   exposes the downstream HTTP API.

pub mod config;
pub mod engine;
pub mod evict;
pub mod health;
pub mod metrics;
pub mod predict;
pub mod providers;
pub mod sched;
pub mod server;
pub mod strategy;
pub mod tune;
pub mod types;
