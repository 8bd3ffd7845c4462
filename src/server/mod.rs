//! HTTP API for the downstream consumer.
//!
//! - [`api`]: Request/response types and route handlers
//! - [`alerts`]: SSE streaming of health alerts

pub mod alerts;
pub mod api;
