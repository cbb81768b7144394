//! Emits the CRD manifests this controller owns.
//!
//! `Machine` and `BareMetalHost` are external resources this controller
//! only reads and patches a subset of fields on; their CRDs belong to
//! their respective owning controllers and are not generated here.

use kube::CustomResourceExt;
use metal3_remediation::crd::{Metal3Remediation, Metal3RemediationTemplate};

fn main() {
    print!("{}", serde_yaml::to_string(&Metal3Remediation::crd()).unwrap());
    println!("---");
    print!("{}", serde_yaml::to_string(&Metal3RemediationTemplate::crd()).unwrap());
}
