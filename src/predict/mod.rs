//! Prefetch prediction generation.
//!
//! - [`prediction`]: the Prediction type plus dedup/rank/expiry pipeline
//! - [`generator`]: the per-layer heuristics that emit predictions

pub mod generator;
pub mod prediction;
