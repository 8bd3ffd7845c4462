//! Online self-tuning.
//!
//! - [`params`]: the tunable parameter set (baseline + current)
//! - [`experiment`]: timed A/B experiments between parameter sets
//! - [`tuner`]: rolling metric history, recommendations, auto-apply

pub mod experiment;
pub mod params;
pub mod tuner;
