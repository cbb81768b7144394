//! Metal3Remediation Custom Resource Definition
//!
//! A Metal3Remediation is a declarative request to recover one Machine by
//! power-cycling its backing BareMetalHost. Its lifetime spans one
//! power-cycle attempt plus any retries permitted by `strategy.retryLimit`.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Only supported remediation strategy kind.
pub const REBOOT_REMEDIATION_STRATEGY: &str = "Reboot";

/// Finalizer carried on the Remediation while phase is Running or Waiting.
pub const REMEDIATION_FINALIZER: &str = "metal3-remediation";

/// Sentinel value written under [`UNHEALTHY_ANNOTATION`].
pub const UNHEALTHY_ANNOTATION_VALUE: &str = "capm3/UnhealthyNode";

/// Annotation on the BareMetalHost marking it unhealthy, so host selection
/// logic skips it.
pub const UNHEALTHY_ANNOTATION: &str = "capm3/UnhealthyNode";

/// Annotation on the Machine naming the BareMetalHost, as `namespace/name`.
pub const HOST_ANNOTATION: &str = "metal3.io/BareMetalHost";

/// Annotation on the Remediation carrying the JSON-serialized Node annotations backup.
pub const NODE_ANNOTATIONS_BACKUP_ANNOTATION: &str = "remediation.metal3.io/node-annotations-backup";

/// Annotation on the Remediation carrying the JSON-serialized Node labels backup.
pub const NODE_LABELS_BACKUP_ANNOTATION: &str = "remediation.metal3.io/node-labels-backup";

/// Label on the Machine identifying control-plane/master nodes.
pub const MACHINE_ROLE_LABEL: &str = "machine.openshift.io/cluster-api-machine-role";
pub const MACHINE_ROLE_MASTER: &str = "master";

/// Coarse state of a Metal3Remediation.
///
/// `None` in `Metal3RemediationStatus::phase` represents the unset ("")
/// phase prior to first observation; every other state is a closed, exhaustively
/// matched variant rather than a string compared by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum RemediationPhase {
    Running,
    Waiting,
    Deleting,
    Failed,
}

impl RemediationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemediationPhase::Running => "Running",
            RemediationPhase::Waiting => "Waiting",
            RemediationPhase::Deleting => "Deleting",
            RemediationPhase::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for RemediationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remediation strategy: kind, timeout, and retry budget.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemediationStrategy {
    /// Remediation strategy kind. Only `"Reboot"` is supported.
    #[serde(rename = "type", default)]
    pub type_: String,

    /// Minimum time to wait for the current remediation step to succeed
    /// before retrying or escalating. Admission requires >= 100s.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Number of remediation retries before escalating to Machine deletion.
    /// Admission requires >= 1.
    #[serde(default)]
    pub retry_limit: i32,
}

impl RemediationStrategy {
    /// Parses `timeout` (an ISO-8601-ish Go duration string, e.g. "600s") into
    /// a `std::time::Duration`. Returns `None` if unset or unparseable.
    pub fn timeout_duration(&self) -> Option<std::time::Duration> {
        self.timeout.as_deref().and_then(parse_go_duration)
    }
}

/// Parses durations of the shape accepted by Go's `time.ParseDuration` for the
/// subset this controller needs: a plain integer followed by `s`, `m`, or `h`.
pub fn parse_go_duration(s: &str) -> Option<std::time::Duration> {
    let s = s.trim();
    if let Some(num) = s.strip_suffix('s') {
        return num.parse::<f64>().ok().map(std::time::Duration::from_secs_f64);
    }
    if let Some(num) = s.strip_suffix('m') {
        return num
            .parse::<f64>()
            .ok()
            .map(|m| std::time::Duration::from_secs_f64(m * 60.0));
    }
    if let Some(num) = s.strip_suffix('h') {
        return num
            .parse::<f64>()
            .ok()
            .map(|h| std::time::Duration::from_secs_f64(h * 3600.0));
    }
    s.parse::<f64>().ok().map(std::time::Duration::from_secs_f64)
}

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Metal3Remediation",
    namespaced,
    status = "Metal3RemediationStatus",
    shortname = "m3r",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"RetryCount","type":"integer","jsonPath":".status.retryCount"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct Metal3RemediationSpec {
    pub strategy: RemediationStrategy,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Metal3RemediationStatus {
    /// Current phase. Unset ("") is represented as `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<RemediationPhase>,

    /// Timestamp of the most recent remediation attempt. Only ever advances
    /// forward.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_remediated: Option<DateTime<Utc>>,

    /// Number of remediation retries performed so far. Only ever increases.
    #[serde(default)]
    pub retry_count: i32,

    /// Generation observed by the last error-free reconcile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_seconds() {
        assert_eq!(
            parse_go_duration("100s"),
            Some(std::time::Duration::from_secs(100))
        );
    }

    #[test]
    fn parses_minutes() {
        assert_eq!(
            parse_go_duration("2m"),
            Some(std::time::Duration::from_secs(120))
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_go_duration("not-a-duration"), None);
    }

    #[test]
    fn phase_round_trips_through_serde() {
        let s = serde_json::to_string(&RemediationPhase::Waiting).unwrap();
        assert_eq!(s, "\"Waiting\"");
        let p: RemediationPhase = serde_json::from_str(&s).unwrap();
        assert_eq!(p, RemediationPhase::Waiting);
    }
}
