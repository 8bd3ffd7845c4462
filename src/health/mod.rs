//! Cache health scoring and alerting.

pub mod monitor;
