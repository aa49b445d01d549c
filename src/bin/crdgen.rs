//! CRD YAML Generator
//!
//! This binary generates the Kubernetes CRD manifests for the custom
//! resources defined by the integration-operator.
//!
//! Usage: cargo run --bin crdgen > deploy/crds/all.yaml

use integration_operator::crd::generate_crds;

fn main() -> anyhow::Result<()> {
    for crd in generate_crds()? {
        println!("---");
        print!("{}", crd);
    }
    Ok(())
}
