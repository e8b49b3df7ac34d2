//! Prints the CustomResourceDefinitions of the operator as a multi-document YAML stream
//!
//! Usage: `cargo run -p crds --bin crdgen > config/crd/crds.yaml`

use crds::{Agent, PodAutoscaler};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    for crd in [Agent::crd(), PodAutoscaler::crd()] {
        print!("---\n{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
