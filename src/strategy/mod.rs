//! Prefetch strategies and runtime strategy selection.
//!
//! - [`catalog`]: Strategy, Layer, Condition and ResourceBudget definitions
//!   plus the built-in strategy catalog
//! - [`selector`]: condition-satisfaction scoring with resource penalties

pub mod catalog;
pub mod selector;
