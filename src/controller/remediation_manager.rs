//! Remediation Manager
//!
//! Stateful façade over one `(Metal3Remediation, Machine, BareMetalHost,
//! Node)` quadruple. Ported operation-for-operation from
//! `original_source/pkg/baremetal/metal3remediation_manager.go`; mutations
//! to the Remediation are applied in memory only, the reconciler's patch
//! guard commits them on exit.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Node;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use serde_json::json;

use crate::crd::{
    BareMetalHost, Machine, Metal3Remediation, RemediationPhase, HOST_ANNOTATION,
    MACHINE_ROLE_LABEL, MACHINE_ROLE_MASTER, NODE_ANNOTATIONS_BACKUP_ANNOTATION,
    NODE_LABELS_BACKUP_ANNOTATION, REMEDIATION_FINALIZER, UNHEALTHY_ANNOTATION,
    UNHEALTHY_ANNOTATION_VALUE,
};
use crate::error::{Error, Result};

use super::accessor::ResourceAccessor;
use super::clock::Clock;

/// Result of [`RemediationManager::time_to_remediate`].
pub struct RemediationTiming {
    pub expired: bool,
    pub next: std::time::Duration,
}

/// One live remediation attempt: the Remediation and Machine records plus
/// the accessor used to reach Host/Node/Machine in the cluster.
pub struct RemediationManager<A: ResourceAccessor> {
    accessor: Arc<A>,
    clock: Arc<dyn Clock>,
    pub remediation: Metal3Remediation,
    pub machine: Machine,
}

impl<A: ResourceAccessor> RemediationManager<A> {
    pub fn new(
        accessor: Arc<A>,
        clock: Arc<dyn Clock>,
        remediation: Metal3Remediation,
        machine: Machine,
    ) -> Self {
        Self {
            accessor,
            clock,
            remediation,
            machine,
        }
    }

    fn namespace(&self) -> String {
        self.remediation.namespace().unwrap_or_default()
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.remediation.metadata
    }

    // --- finalizer -------------------------------------------------------

    pub fn has_finalizer(&self) -> bool {
        self.remediation
            .metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|x| x == REMEDIATION_FINALIZER))
    }

    pub fn set_finalizer(&mut self) {
        let finalizers = self.meta_mut().finalizers.get_or_insert_with(Vec::new);
        if !finalizers.iter().any(|f| f == REMEDIATION_FINALIZER) {
            finalizers.push(REMEDIATION_FINALIZER.to_string());
        }
    }

    pub fn unset_finalizer(&mut self) {
        if let Some(finalizers) = self.meta_mut().finalizers.as_mut() {
            finalizers.retain(|f| f != REMEDIATION_FINALIZER);
        }
    }

    // --- timing ------------------------------------------------------

    /// If `lastRemediated` is unset, remediation has not been attempted:
    /// not expired, retry after the full timeout. Otherwise compares
    /// elapsed wall-clock time against `timeout`.
    pub fn time_to_remediate(&self, timeout: std::time::Duration) -> RemediationTiming {
        let Some(last) = self.remediation.status.as_ref().and_then(|s| s.last_remediated) else {
            return RemediationTiming {
                expired: false,
                next: timeout,
            };
        };
        let now = self.clock.now();
        let elapsed = (now - last).to_std().unwrap_or(std::time::Duration::ZERO);
        if elapsed >= timeout {
            RemediationTiming {
                expired: true,
                next: std::time::Duration::from_secs(0),
            }
        } else {
            RemediationTiming {
                expired: false,
                next: timeout - elapsed + std::time::Duration::from_secs(1),
            }
        }
    }

    // --- host resolution -----------------------------------------------

    /// Resolves the Host named by the Machine's [`HOST_ANNOTATION`].
    /// Missing annotation is a hard error; a host that genuinely does not
    /// exist resolves to `Ok(None)` so the reconciler requeues rather than
    /// dereferencing an absent Host (the nil-host case is never dispatched
    /// on directly).
    pub async fn get_unhealthy_host(&self) -> Result<Option<BareMetalHost>> {
        let raw = self
            .machine
            .annotations()
            .get(HOST_ANNOTATION)
            .ok_or_else(|| Error::MissingHostAnnotation(self.machine.name_any()))?;
        let (host_ns, host_name) = raw
            .split_once('/')
            .ok_or_else(|| Error::InvalidHostAnnotation(raw.clone()))?;
        self.accessor.get_host(host_ns, host_name).await
    }

    // --- power-off annotation --------------------------------------------

    fn power_off_key(&self) -> String {
        format!("reboot.metal3.io/metal3-remediation-{}", self.remediation.uid().unwrap_or_default())
    }

    pub fn is_power_off_requested(&self, host: &BareMetalHost) -> bool {
        host.annotations().contains_key(&self.power_off_key())
    }

    pub async fn set_power_off_annotation(&self, host: &BareMetalHost) -> Result<()> {
        let patch = json!({
            "metadata": {
                "annotations": {
                    self.power_off_key(): "{\"mode\":\"hard\"}",
                }
            }
        });
        self.accessor
            .patch_host(&host.namespace().unwrap_or_default(), &host.name_any(), patch)
            .await
    }

    pub async fn remove_power_off_annotation(&self, host: &BareMetalHost) -> Result<()> {
        let patch = json!({
            "metadata": {
                "annotations": {
                    self.power_off_key(): Option::<String>::None,
                }
            }
        });
        self.accessor
            .patch_host(&host.namespace().unwrap_or_default(), &host.name_any(), patch)
            .await
    }

    pub fn is_powered_on(&self, host: &BareMetalHost) -> bool {
        host.status.as_ref().is_some_and(|s| s.powered_on)
    }

    pub async fn set_unhealthy_annotation(&self, host: &BareMetalHost) -> Result<()> {
        if host.annotations().get(UNHEALTHY_ANNOTATION).map(String::as_str)
            == Some(UNHEALTHY_ANNOTATION_VALUE)
        {
            return Ok(());
        }
        let patch = json!({
            "metadata": {
                "annotations": {
                    UNHEALTHY_ANNOTATION: UNHEALTHY_ANNOTATION_VALUE,
                }
            }
        });
        self.accessor
            .patch_host(&host.namespace().unwrap_or_default(), &host.name_any(), patch)
            .await
    }

    pub fn online_status(&self, host: &BareMetalHost) -> bool {
        host.spec.online
    }

    // --- retry bookkeeping -----------------------------------------------

    pub fn retry_limit_is_set(&self) -> bool {
        self.remediation.spec.strategy.retry_limit > 0
    }

    pub fn has_reach_retry_limit(&self) -> bool {
        let retry_count = self.remediation.status.as_ref().map(|s| s.retry_count).unwrap_or(0);
        retry_count >= self.remediation.spec.strategy.retry_limit
    }

    pub fn increase_retry_count(&mut self) {
        let status = self.remediation.status.get_or_insert_with(Default::default);
        status.retry_count += 1;
    }

    // --- phase bookkeeping ------------------------------------------------

    pub fn get_remediation_phase(&self) -> Option<RemediationPhase> {
        self.remediation.status.as_ref().and_then(|s| s.phase)
    }

    pub fn set_remediation_phase(&mut self, phase: RemediationPhase) {
        self.remediation.status.get_or_insert_with(Default::default).phase = Some(phase);
    }

    pub fn get_last_remediated_time(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.remediation.status.as_ref().and_then(|s| s.last_remediated)
    }

    pub fn set_last_remediation_time(&mut self) {
        let now = self.clock.now();
        self.remediation.status.get_or_insert_with(Default::default).last_remediated = Some(now);
    }

    pub fn get_timeout(&self) -> Option<std::time::Duration> {
        self.remediation.spec.strategy.timeout_duration()
    }

    // --- node ops ----------------------------------------------------------

    /// `Ok(None)` when the Machine has no `nodeRef` or the Node is gone.
    /// Forbidden errors propagate so the reconciler can degrade gracefully.
    pub async fn get_node(&self) -> Result<Option<Node>> {
        let Some(node_ref) = self.machine.status.as_ref().and_then(|s| s.node_ref.as_ref()) else {
            return Ok(None);
        };
        self.accessor.get_node(&node_ref.name).await
    }

    pub async fn update_node(&self, node: &Node) -> Result<()> {
        self.accessor.update_node(node).await
    }

    /// No-op if `node` already carries a deletion timestamp.
    pub async fn delete_node(&self, node: &Node) -> Result<()> {
        if node.metadata.deletion_timestamp.is_some() {
            return Ok(());
        }
        self.accessor.delete_node(&node.name_any()).await
    }

    // --- backup annotations ------------------------------------------------

    /// Stores JSON-serialized annotation/label maps on the Remediation.
    /// Returns whether either value actually changed.
    pub fn set_node_backup_annotations(&mut self, annotations_json: &str, labels_json: &str) -> bool {
        let meta = self.meta_mut();
        let map = meta.annotations.get_or_insert_with(BTreeMap::new);
        let mut changed = false;
        if map.get(NODE_ANNOTATIONS_BACKUP_ANNOTATION).map(String::as_str) != Some(annotations_json) {
            map.insert(
                NODE_ANNOTATIONS_BACKUP_ANNOTATION.to_string(),
                annotations_json.to_string(),
            );
            changed = true;
        }
        if map.get(NODE_LABELS_BACKUP_ANNOTATION).map(String::as_str) != Some(labels_json) {
            map.insert(NODE_LABELS_BACKUP_ANNOTATION.to_string(), labels_json.to_string());
            changed = true;
        }
        changed
    }

    pub fn get_node_backup_annotations(&self) -> (String, String) {
        let annotations = self
            .remediation
            .annotations()
            .get(NODE_ANNOTATIONS_BACKUP_ANNOTATION)
            .cloned()
            .unwrap_or_default();
        let labels = self
            .remediation
            .annotations()
            .get(NODE_LABELS_BACKUP_ANNOTATION)
            .cloned()
            .unwrap_or_default();
        (annotations, labels)
    }

    pub fn remove_node_backup_annotations(&mut self) {
        if let Some(map) = self.meta_mut().annotations.as_mut() {
            map.remove(NODE_ANNOTATIONS_BACKUP_ANNOTATION);
            map.remove(NODE_LABELS_BACKUP_ANNOTATION);
        }
    }

    // --- escalation --------------------------------------------------------

    /// False if the Host is externally provisioned, the Machine has no
    /// controller owner, or the Machine is labelled as control-plane.
    pub fn can_reprovision(&self, host: &BareMetalHost) -> bool {
        if host.spec.externally_provisioned {
            return false;
        }
        let has_controller_owner = self
            .machine
            .owner_references()
            .iter()
            .any(|o| o.controller == Some(true));
        if !has_controller_owner {
            return false;
        }
        if self.machine.labels().get(MACHINE_ROLE_LABEL).map(String::as_str) == Some(MACHINE_ROLE_MASTER) {
            return false;
        }
        true
    }

    pub async fn delete_machine(&self) -> Result<()> {
        self.accessor
            .delete_machine(&self.namespace(), &self.machine.name_any())
            .await
    }
}

/// Restores backed-up annotations/labels onto a re-registered Node.
/// Deserialization failures are treated as an empty map, never fatal.
/// Merge-only: a key already present on the live Node is left untouched.
pub fn restore_node(node: &mut Node, annotations_json: &str, labels_json: &str) {
    let backup_annotations = decode_backup(annotations_json);
    let backup_labels = decode_backup(labels_json);

    let meta = &mut node.metadata;
    let annotations = meta.annotations.get_or_insert_with(BTreeMap::new);
    for (k, v) in backup_annotations {
        annotations.entry(k).or_insert(v);
    }
    let labels = meta.labels.get_or_insert_with(BTreeMap::new);
    for (k, v) in backup_labels {
        labels.entry(k).or_insert(v);
    }
}

fn decode_backup(raw: &str) -> BTreeMap<String, String> {
    if raw.is_empty() {
        return BTreeMap::new();
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to decode node backup annotations, treating as empty");
        BTreeMap::new()
    })
}
