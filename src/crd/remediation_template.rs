//! Metal3RemediationTemplate Custom Resource Definition
//!
//! Template from which Metal3Remediations are instantiated by the external
//! health controller. Validated and defaulted on admission; never mutated by
//! this controller at runtime.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::remediation::Metal3RemediationSpec;

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Metal3RemediationTemplateResource {
    pub spec: Metal3RemediationSpec,
}

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Metal3RemediationTemplate",
    namespaced,
    shortname = "m3rt",
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct Metal3RemediationTemplateSpec {
    pub template: Metal3RemediationTemplateResource,
}
