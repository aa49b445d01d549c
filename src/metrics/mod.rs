//! Prometheus metrics for the Integration Operator
//!
//! This module exposes metrics for monitoring reconciliation and garbage collection.

mod prometheus;

pub use prometheus::*;
