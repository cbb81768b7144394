//! Machine resource (subset)
//!
//! This controller only reads a Machine's `metal3.io/BareMetalHost`
//! annotation, its `machine.openshift.io/cluster-api-machine-role` label, its
//! controller owner reference, and `status.nodeRef`; it never interprets
//! `spec`. The full upstream `machine.openshift.io/v1beta1` schema is owned
//! by the Machine controller (out of scope here), so `spec` is modeled as an
//! opaque passthrough map to stay forward-compatible with fields this
//! controller does not care about.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Map;

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "machine.openshift.io",
    version = "v1beta1",
    kind = "Machine",
    namespaced,
    status = "MachineStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    #[serde(flatten, default)]
    #[schemars(skip)]
    pub extra: Map<String, serde_json::Value>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeRef {
    pub name: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_ref: Option<NodeRef>,
}
