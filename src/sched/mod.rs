//! Resource admission control and scheduling.
//!
//! - [`quota`]: the four-dimensional resource budget arithmetic
//! - [`scheduler`]: admission, tiered queueing, periodic draining and
//!   completion feedback

pub mod quota;
pub mod scheduler;
