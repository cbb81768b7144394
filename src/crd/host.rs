//! BareMetalHost resource (subset)
//!
//! This controller reads/writes `spec.online`, `spec.externallyProvisioned`,
//! `status.poweredOn`, and the annotation map. The remaining
//! `metal3.io/v1alpha1` schema (hardware profile, BMC credentials,
//! provisioning state, ...) belongs to the host agent and is out of scope.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "metal3.io",
    version = "v1alpha1",
    kind = "BareMetalHost",
    namespaced,
    status = "BareMetalHostStatus",
    shortname = "bmh"
)]
#[serde(rename_all = "camelCase")]
pub struct BareMetalHostSpec {
    /// When false, the host must not be remediated; the engine sets phase
    /// Failed instead.
    #[serde(default = "default_true")]
    pub online: bool,

    /// When true, this controller will never delete the owning Machine on
    /// escalation.
    #[serde(default)]
    pub externally_provisioned: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BareMetalHostStatus {
    #[serde(default)]
    pub powered_on: bool,
}
