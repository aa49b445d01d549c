//! Reconcilers for the Integration CRD
//!
//! This module contains the business logic for reconciling integrations.
//! Reconcilers are responsible for:
//! - Validating integration specs
//! - Rendering and writing child resources
//! - Updating resource status

pub mod integration;
