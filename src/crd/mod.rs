//! Custom Resource Definitions for the Integration Operator

mod integration;

pub use integration::*;

use kube::CustomResourceExt;

use crate::error::Result;

/// Generate all CRD YAML manifests
pub fn generate_crds() -> Result<Vec<String>> {
    let crd = serde_yaml::to_string(&Integration::crd())
        .map_err(|e| crate::error::Error::validation(format!("cannot render CRD: {e}")))?;
    Ok(vec![crd])
}
