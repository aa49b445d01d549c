//! Integration Kubernetes Operator
//!
//! This operator deploys Camel integrations described by the `Integration`
//! Custom Resource Definition, and garbage collects the child resources
//! left behind by older generations of each integration.

pub mod cluster;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod environment;
pub mod error;
pub mod gc;
pub mod metrics;
pub mod reconcilers;
pub mod selector;
pub mod tasks;

pub use error::{Error, Result};
